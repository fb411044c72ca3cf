//! Course identity and quota model.
//!
//! A course is identified by the `(name, class_no, school)` triple. Quota and
//! the election action href are page-scoped snapshots carried by
//! [`CourseEntry`]; they never participate in equality, so a bare [`Course`]
//! is already the "simplified" form stored in the ignore map.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity triple of a course. Equality and hashing cover exactly these
/// three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Course {
    pub name: String,
    pub class_no: u32,
    pub school: String,
}

impl Course {
    pub fn new(name: impl Into<String>, class_no: u32, school: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_no,
            school: school.into(),
        }
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.name, self.class_no, self.school)
    }
}

/// Seat quota as shown on the enrollment page: `max` is the cap, `used` the
/// currently elected count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub max: u32,
    pub used: u32,
}

impl Quota {
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }

    pub fn has_vacancy(&self) -> bool {
        self.used < self.max
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.used, self.max)
    }
}

/// One row of a parsed course table: the identity plus whatever page-scoped
/// detail the table carried.
#[derive(Debug, Clone)]
pub struct CourseEntry {
    pub course: Course,
    pub status: Option<Quota>,
    /// Election action href, present only when the course is concretely
    /// electable on the current page.
    pub action: Option<String>,
}
