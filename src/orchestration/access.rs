//! Role-based access rules for analysis requests

use crate::config::AccessConfig;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use strum::{Display, EnumString};

/// Identity of whoever asked for an analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    pub role: String,
    /// Teachers this caller supervises
    #[serde(default)]
    pub assigned_teachers: BTreeSet<String>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
            assigned_teachers: BTreeSet::new(),
        }
    }

    pub fn with_assigned_teachers<I, S>(mut self, teachers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assigned_teachers = teachers.into_iter().map(Into::into).collect();
        self
    }
}

/// Closed set of access predicates a role can be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccessRule {
    AnyTeacher,
    OwnRecords,
    AssignedTeachers,
}

impl AccessRule {
    pub fn permits(&self, caller: &Caller, teacher_id: &str) -> bool {
        match self {
            AccessRule::AnyTeacher => true,
            AccessRule::OwnRecords => caller.user_id == teacher_id,
            AccessRule::AssignedTeachers => {
                caller.user_id == teacher_id || caller.assigned_teachers.contains(teacher_id)
            }
        }
    }
}

/// Decides whether a caller may analyze a teacher
pub trait AccessPolicy: Send + Sync + 'static {
    fn authorize(&self, caller: &Caller, teacher_id: &str) -> Result<()>;
}

/// Maps each role to one named rule. Unknown roles are denied.
#[derive(Debug, Clone)]
pub struct RoleBasedPolicy {
    rules: BTreeMap<String, AccessRule>,
}

impl Default for RoleBasedPolicy {
    fn default() -> Self {
        let rules = [
            ("admin", AccessRule::AnyTeacher),
            ("principal", AccessRule::AnyTeacher),
            ("department_head", AccessRule::AssignedTeachers),
            ("teacher", AccessRule::OwnRecords),
        ]
        .into_iter()
        .map(|(role, rule)| (role.to_string(), rule))
        .collect();

        Self { rules }
    }
}

impl RoleBasedPolicy {
    /// Defaults overlaid with the configured role rules
    pub fn from_config(config: &AccessConfig) -> Result<Self> {
        let mut policy = Self::default();
        for (role, rule) in &config.role_rules {
            let rule = AccessRule::from_str(rule).map_err(|_| {
                AppError::Configuration(format!(
                    "unknown access rule '{}' for role '{}'",
                    rule, role
                ))
            })?;
            policy.rules.insert(role.to_lowercase(), rule);
        }
        Ok(policy)
    }

    pub fn rule_for(&self, role: &str) -> Option<AccessRule> {
        self.rules.get(&role.to_lowercase()).copied()
    }
}

impl AccessPolicy for RoleBasedPolicy {
    fn authorize(&self, caller: &Caller, teacher_id: &str) -> Result<()> {
        match self.rule_for(&caller.role) {
            Some(rule) if rule.permits(caller, teacher_id) => Ok(()),
            Some(rule) => Err(AppError::Authorization(format!(
                "role '{}' ({}) may not analyze teacher {}",
                caller.role, rule, teacher_id
            ))),
            None => Err(AppError::Authorization(format!(
                "role '{}' has no analytics access",
                caller.role
            ))),
        }
    }
}
