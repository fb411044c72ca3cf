//! IAAA OAuth handshake: credentials in, 32-character bearer token out.
//!
//! Each handshake uses a disposable HTTP client; nothing about the auth
//! service's session is worth keeping once the token is extracted.

use reqwest::blocking::Client;
use reqwest::header::REFERER;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::outcome::{AuthError, PortalError};
use crate::portal::{AuthClient, USER_AGENT};

const OAUTH_HOME: &str = "https://iaaa.pku.edu.cn/iaaa/oauth.jsp";
const OAUTH_LOGIN: &str = "https://iaaa.pku.edu.cn/iaaa/oauthlogin.do";
const SSO_LOGIN_REDIRECT: &str =
    "http://elective.pku.edu.cn:80/elective2008/agent4Iaaa.jsp/../ssoLogin.do";

pub struct IaaaClient {
    timeout: Duration,
}

impl IaaaClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl AuthClient for IaaaClient {
    fn oauth_login(&self, student_id: &str, password: &str) -> Result<String, PortalError> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let referer = format!(
            "{OAUTH_HOME}?appID=syllabus&appName=%E5%AD%A6%E7%94%9F%E9%80%89%E8%AF%BE%E7%B3%BB%E7%BB%9F&redirectUrl={SSO_LOGIN_REDIRECT}"
        );
        let resp = http
            .post(OAUTH_LOGIN)
            .header(REFERER, referer)
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&[
                ("appid", "syllabus"),
                ("userName", student_id),
                ("password", password),
                ("randCode", ""),
                ("smsCode", ""),
                ("otpCode", ""),
                ("redirUrl", SSO_LOGIN_REDIRECT),
            ])
            .send()?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(PortalError::BadStatus(status));
        }

        let body: Value = resp.json()?;
        if !body.get("success").and_then(Value::as_bool).unwrap_or(false) {
            let msg = body
                .pointer("/errors/msg")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            debug!(%msg, "auth service rejected the handshake");
            return Err(classify_failure(msg).into());
        }

        let token = body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| PortalError::Malformed("login response carries no token".into()))?;
        if token.len() != 32 {
            return Err(PortalError::Malformed(format!(
                "token has unexpected length {}",
                token.len()
            )));
        }
        Ok(token.to_string())
    }
}

fn classify_failure(msg: String) -> AuthError {
    if msg.contains("密码") || msg.contains("用户名") || msg.contains("学号") {
        AuthError::BadCredentials
    } else if msg.contains("冻结") || msg.contains("禁止") {
        AuthError::Banned
    } else {
        AuthError::NotSuccess(msg)
    }
}
