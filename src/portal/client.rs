//! Blocking client for the elective site.
//!
//! One `ElectiveClient` is one portal session: its cookie jar carries the
//! authentication state, and `reset_session` swaps in a fresh jar. Every
//! HTML response runs through the validator chain composed in the
//! constructor; raw endpoints (captcha image, captcha validation JSON) only
//! get the status check.

use rand::Rng;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::REFERER;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::outcome::{ElectOutcome, PortalError};
use crate::portal::validate::{extract_outcome, Page, StatusCheck, TitleCheck, Validator};
use crate::portal::{CaptchaVerdict, ElectivePortal, SsoLanding, USER_AGENT};

const HOST: &str = "elective.pku.edu.cn";
const BASE: &str = "http://elective.pku.edu.cn/elective2008";
const CONTROLLER: &str =
    "http://elective.pku.edu.cn/elective2008/edu/pku/stu/elective/controller";

fn sso_login_url() -> String {
    format!("{BASE}/ssoLogin.do")
}

fn logout_url() -> String {
    format!("{BASE}/logout.do")
}

fn help_url() -> String {
    format!("{CONTROLLER}/help/HelpController.jpf")
}

fn supply_cancel_url() -> String {
    format!("{CONTROLLER}/supplement/SupplyCancel.do")
}

fn draw_servlet_url() -> String {
    format!("{BASE}/DrawServlet")
}

fn validate_url() -> String {
    format!("{CONTROLLER}/supplement/validate.do")
}

pub struct ElectiveClient {
    http: Mutex<Client>,
    timeout: Duration,
    validators: Vec<Box<dyn Validator>>,
}

impl ElectiveClient {
    pub fn new(timeout: Duration) -> Result<Self, PortalError> {
        Ok(Self {
            http: Mutex::new(build_http(timeout)?),
            timeout,
            validators: vec![Box::new(StatusCheck), Box::new(TitleCheck)],
        })
    }

    fn http(&self) -> Client {
        // reqwest clients are cheaply cloneable handles.
        self.http.lock().expect("http client lock poisoned").clone()
    }

    fn fetch(&self, req: RequestBuilder, validate_html: bool) -> Result<Page, PortalError> {
        let resp = req.send()?;
        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let body = resp.text()?;
        let page = Page { status, url, body };
        if validate_html {
            for validator in &self.validators {
                validator.check(&page)?;
            }
        } else {
            StatusCheck.check(&page)?;
        }
        Ok(page)
    }

    fn get_html(&self, url: &str, referer: Option<&str>) -> Result<Page, PortalError> {
        let mut req = self.http().get(url);
        if let Some(referer) = referer {
            req = req.header(REFERER, referer);
        }
        self.fetch(req, true)
    }
}

fn build_http(timeout: Duration) -> Result<Client, PortalError> {
    Ok(Client::builder()
        .cookie_store(true)
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

impl ElectivePortal for ElectiveClient {
    fn sso_login(&self, token: &str) -> Result<SsoLanding, PortalError> {
        let rand: f64 = rand::thread_rng().gen();
        let req = self
            .http()
            .get(sso_login_url())
            .query(&[("rand", rand.to_string().as_str()), ("token", token)]);
        let page = self.fetch(req, true)?;
        Ok(SsoLanding {
            url: page.url,
            html: page.body,
        })
    }

    fn select_identity(&self, sida: &str, sttp: &str, referer: &str) -> Result<(), PortalError> {
        let req = self
            .http()
            .get(sso_login_url())
            .query(&[("sida", sida), ("sttp", sttp)])
            .header(REFERER, referer);
        self.fetch(req, true)?;
        Ok(())
    }

    fn supply_cancel(&self, page: u32) -> Result<String, PortalError> {
        let url = supply_cancel_url();
        let mut req = self.http().get(&url).header(REFERER, url.as_str());
        if page > 1 {
            // The listing paginates in rows of 20.
            req = req.query(&[("netui_row", format!("electableListGrid;{}", (page - 1) * 20))]);
        }
        Ok(self.fetch(req, true)?.body)
    }

    fn captcha_image(&self) -> Result<Vec<u8>, PortalError> {
        let rand: f64 = rand::thread_rng().gen::<f64>() * 10000.0;
        let resp = self
            .http()
            .get(draw_servlet_url())
            .query(&[("Rand", rand.to_string())])
            .header(REFERER, supply_cancel_url())
            .send()?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(PortalError::BadStatus(status));
        }
        Ok(resp.bytes()?.to_vec())
    }

    fn submit_captcha(&self, code: &str) -> Result<CaptchaVerdict, PortalError> {
        let req = self
            .http()
            .post(validate_url())
            .header(REFERER, supply_cancel_url())
            .form(&[("validCode", code)]);
        let page = self.fetch(req, false)?;
        // The endpoint answers JSON, except when the portal substitutes an
        // error page.
        let body: Value = serde_json::from_str(&page.body)
            .map_err(|_| PortalError::Malformed("captcha validation response is not JSON".into()))?;
        let valid = body
            .get("valid")
            .and_then(Value::as_str)
            .ok_or_else(|| PortalError::Malformed("captcha validation without `valid`".into()))?;
        Ok(match valid {
            "2" => CaptchaVerdict::Accepted,
            "0" => CaptchaVerdict::Rejected,
            other => CaptchaVerdict::Unrecognized(other.to_string()),
        })
    }

    fn elect(&self, action: &str) -> Result<ElectOutcome, PortalError> {
        let url = format!("http://{HOST}{action}");
        let page = self.get_html(&url, Some(&supply_cancel_url()))?;
        let outcome = extract_outcome(&page.body);
        debug!(kind = outcome.kind(), "election response classified");
        Ok(outcome)
    }

    fn logout(&self) -> Result<(), PortalError> {
        self.get_html(&logout_url(), Some(&help_url()))?;
        Ok(())
    }

    fn reset_session(&self) -> Result<(), PortalError> {
        let fresh = build_http(self.timeout)?;
        *self.http.lock().expect("http client lock poisoned") = fresh;
        Ok(())
    }
}
