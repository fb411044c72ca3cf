//! Scripted stand-ins for the portal collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use elector::captcha::Recognizer;
use elector::course::Course;
use elector::outcome::{ElectOutcome, PortalError};
use elector::portal::{AuthClient, CaptchaVerdict, ElectivePortal, SsoLanding};

/// Session token embedded in the fake SSO landing page.
pub const SIDA: &str = "0123456789abcdef0123456789abcdef";

/// Scripted elective portal. Enrollment pages are consumed front to back;
/// once the script runs dry the last page repeats, so a script whose final
/// page resolves every goal terminates the run.
pub struct FakePortal {
    pages: Mutex<VecDeque<Result<String, PortalError>>>,
    last_page: Mutex<String>,
    outcomes: Mutex<HashMap<String, VecDeque<ElectOutcome>>>,
    verdicts: Mutex<VecDeque<CaptchaVerdict>>,
    pub elect_calls: Mutex<Vec<String>>,
    pub identity_selections: Mutex<Vec<(String, String)>>,
    pub captcha_fetches: AtomicUsize,
    pub resets: AtomicUsize,
    pub logouts: AtomicUsize,
}

impl FakePortal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(VecDeque::new()),
            last_page: Mutex::new(String::new()),
            outcomes: Mutex::new(HashMap::new()),
            verdicts: Mutex::new(VecDeque::new()),
            elect_calls: Mutex::new(Vec::new()),
            identity_selections: Mutex::new(Vec::new()),
            captcha_fetches: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
        })
    }

    pub fn push_page(&self, html: impl Into<String>) {
        self.pages.lock().unwrap().push_back(Ok(html.into()));
    }

    pub fn push_page_error(&self, err: PortalError) {
        self.pages.lock().unwrap().push_back(Err(err));
    }

    /// Stage the next outcome the portal reports for `action`.
    pub fn stage_outcome(&self, action: &str, outcome: ElectOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Stage a captcha verdict; with no staged verdicts every code is
    /// accepted.
    pub fn push_verdict(&self, verdict: CaptchaVerdict) {
        self.verdicts.lock().unwrap().push_back(verdict);
    }
}

/// Cloneable handle the pool hands out; every session shares the one script.
#[derive(Clone)]
pub struct SharedPortal(pub Arc<FakePortal>);

impl ElectivePortal for SharedPortal {
    fn sso_login(&self, _token: &str) -> Result<SsoLanding, PortalError> {
        Ok(SsoLanding {
            url: "http://fake-portal/landing".to_string(),
            html: format!("<a href=\"ssoLogin.do?sida={SIDA}&sttp=bzx\">主修</a>"),
        })
    }

    fn select_identity(&self, sida: &str, sttp: &str, _referer: &str) -> Result<(), PortalError> {
        self.0
            .identity_selections
            .lock()
            .unwrap()
            .push((sida.to_string(), sttp.to_string()));
        Ok(())
    }

    fn supply_cancel(&self, _page: u32) -> Result<String, PortalError> {
        match self.0.pages.lock().unwrap().pop_front() {
            Some(Ok(html)) => {
                *self.0.last_page.lock().unwrap() = html.clone();
                Ok(html)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.0.last_page.lock().unwrap().clone()),
        }
    }

    fn captcha_image(&self) -> Result<Vec<u8>, PortalError> {
        self.0.captcha_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    fn submit_captcha(&self, _code: &str) -> Result<CaptchaVerdict, PortalError> {
        Ok(self
            .0
            .verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CaptchaVerdict::Accepted))
    }

    fn elect(&self, action: &str) -> Result<ElectOutcome, PortalError> {
        self.0.elect_calls.lock().unwrap().push(action.to_string());
        match self
            .0
            .outcomes
            .lock()
            .unwrap()
            .get_mut(action)
            .and_then(VecDeque::pop_front)
        {
            Some(outcome) => Ok(outcome),
            None => panic!("no staged outcome for election action {action}"),
        }
    }

    fn logout(&self) -> Result<(), PortalError> {
        self.0.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reset_session(&self) -> Result<(), PortalError> {
        self.0.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted auth service: staged failures are consumed first, then every
/// handshake succeeds.
pub struct FakeAuth {
    pub calls: AtomicUsize,
    failures: Mutex<VecDeque<PortalError>>,
}

impl FakeAuth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
        })
    }

    pub fn push_failure(&self, err: PortalError) {
        self.failures.lock().unwrap().push_back(err);
    }
}

pub struct SharedAuth(pub Arc<FakeAuth>);

impl AuthClient for SharedAuth {
    fn oauth_login(&self, _student_id: &str, _password: &str) -> Result<String, PortalError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.0.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok("a".repeat(32))
    }
}

/// Always recognizes the same code; counts invocations.
#[derive(Clone)]
pub struct FakeRecognizer {
    pub calls: Arc<AtomicUsize>,
}

impl FakeRecognizer {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Recognizer for FakeRecognizer {
    fn recognize(&self, _image: &[u8]) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("AB3D".to_string())
    }
}

/// One candidate row of a fake enrollment page.
pub struct Candidate<'a> {
    pub course: &'a Course,
    pub max: u32,
    pub used: u32,
    pub action: Option<&'a str>,
}

/// Render an enrollment-status page with the given candidate and elected
/// tables, in the portal's datagrid markup.
pub fn page(candidates: &[Candidate<'_>], elected: &[&Course]) -> String {
    let mut cand_rows = String::new();
    for c in candidates {
        let link = match c.action {
            Some(href) => format!("<a href=\"{href}\">补选</a>"),
            None => "已满".to_string(),
        };
        cand_rows.push_str(&format!(
            "<tr class=\"datagrid-odd\"><td>{}</td><td>{}</td><td>{}</td>\
             <td>{} / {}</td><td>{}</td></tr>",
            c.course.name, c.course.class_no, c.course.school, c.max, c.used, link
        ));
    }
    let mut elected_rows = String::new();
    for c in elected {
        elected_rows.push_str(&format!(
            "<tr class=\"datagrid-even\"><td>{}</td><td>{}</td><td>{}</td></tr>",
            c.name, c.class_no, c.school
        ));
    }
    format!(
        "<html><body>\
         <table class=\"datagrid\">\
         <tr class=\"datagrid-header\"><th>课程名</th><th>班号</th>\
         <th>开课单位</th><th>限数/已选</th><th>补选</th></tr>{cand_rows}</table>\
         <table class=\"datagrid\">\
         <tr class=\"datagrid-header\"><th>课程名</th><th>班号</th><th>开课单位</th></tr>\
         {elected_rows}</table>\
         </body></html>"
    )
}
