//! Response validators and outcome extraction.
//!
//! The portal reports everything in-band: HTTP 200 pages whose
//! `<title>` or tips banner carries the actual result. Each response runs
//! through an ordered validator chain composed at client construction;
//! election responses are additionally folded into an [`ElectOutcome`] by
//! marker matching. Unknown markers land in `Unknown`/`Unrecognized`
//! variants rather than being swallowed.

use regex::Regex;
use std::sync::OnceLock;

use crate::outcome::{ElectOutcome, PortalError, SystemError};

/// A fetched page, after transport but before interpretation.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub url: String,
    pub body: String,
}

/// One step of the response validation chain.
pub trait Validator: Send + Sync {
    fn check(&self, page: &Page) -> Result<(), PortalError>;
}

/// Rejects anything but HTTP 200, classifying 5xx separately so callers can
/// count server congestion on its own.
pub struct StatusCheck;

impl Validator for StatusCheck {
    fn check(&self, page: &Page) -> Result<(), PortalError> {
        match page.status {
            200 => Ok(()),
            s @ (500..=503) => Err(PortalError::ServerBusy(s)),
            s => Err(PortalError::BadStatus(s)),
        }
    }
}

/// Detects the portal's system-error page by its title and classifies the
/// error text.
pub struct TitleCheck;

impl Validator for TitleCheck {
    fn check(&self, page: &Page) -> Result<(), PortalError> {
        let title = match extract_title(&page.body) {
            Some(t) => t,
            None => return Ok(()),
        };
        if title != "系统异常" {
            return Ok(());
        }
        Err(classify_system_page(&page.body).into())
    }
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<title>(.*?)</title>").expect("static regex"))
}

fn err_info_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The error page wraps its text as `<strong>出错提示:</strong>text</td>`.
    RE.get_or_init(|| {
        Regex::new(r"(?s)<strong>\s*出错提示:\s*</strong>(.*?)</td>").expect("static regex")
    })
}

pub(crate) fn extract_title(body: &str) -> Option<String> {
    title_re()
        .captures(body)
        .map(|c| c[1].trim().to_string())
}

fn classify_system_page(body: &str) -> SystemError {
    let err = err_info_re()
        .captures(body)
        .map(|c| strip_tags(&c[1]))
        .unwrap_or_default();
    classify_system_text(&err)
}

fn classify_system_text(err: &str) -> SystemError {
    if err.contains("请不要用刷课机刷课") {
        SystemError::CaughtCheating
    } else if err.contains("Token无效") || err.contains("token无效") {
        SystemError::InvalidToken
    } else if err.contains("您尚未登录或者会话超时") {
        SystemError::SessionExpired
    } else if err.contains("不在操作时段") {
        SystemError::NotInOperatingTime
    } else if err.contains("索引错误") {
        SystemError::CourseIndex
    } else if err.contains("验证码不正确") {
        SystemError::Captcha
    } else if err.contains("无验证信息") {
        SystemError::NoAuthInfo
    } else if err.contains("你与他人共享了回话") {
        SystemError::SharedSession
    } else {
        SystemError::Unknown(err.to_string())
    }
}

fn tips_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<td[^>]*id="msgTips"[^>]*>(.*)"#).expect("static regex"))
}

/// Interpret the tips banner of an election response. Pages without a tips
/// banner yield `Unrecognized` so the goal stays eligible for a retry
/// instead of being silently dropped.
pub fn extract_outcome(body: &str) -> ElectOutcome {
    let tips = match tips_re().captures(body) {
        Some(c) => strip_tags(&c[1]),
        None => return ElectOutcome::Unrecognized("no tips banner".to_string()),
    };
    if tips.contains("补选课程成功") {
        ElectOutcome::Success
    } else if tips.contains("您已经选过该课程") {
        ElectOutcome::Repeated
    } else if tips.contains("上课时间冲突") {
        ElectOutcome::TimeConflict
    } else if tips.contains("考试时间冲突") {
        ElectOutcome::ExamTimeConflict
    } else if tips.contains("超时操作") {
        ElectOutcome::OperationTimedOut
    } else if tips.contains("开放选课") && tips.contains("补退选") {
        ElectOutcome::PermissionWindow
    } else if tips.contains("总学分已经超过规定学分上限") {
        ElectOutcome::CreditLimit
    } else if tips.contains("只能选其一门") {
        ElectOutcome::MutexViolation
    } else if tips.contains("只能修一门英语课") {
        ElectOutcome::MultiEnglish
    } else if tips.contains("只能修一门体育课") {
        ElectOutcome::MultiPe
    } else if tips.contains("选课操作失败") {
        ElectOutcome::Failed
    } else {
        ElectOutcome::Unrecognized(tips.chars().take(60).collect())
    }
}

pub(crate) fn strip_tags(fragment: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"));
    re.replace_all(fragment, "")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}
