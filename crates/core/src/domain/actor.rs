use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered role hierarchy; a higher level implies every right of the lower ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    CompanyAdmin,
    TenderManager,
    Evaluator,
    User,
}

impl Role {
    pub fn level(self) -> u8 {
        match self {
            Self::Admin => 100,
            Self::CompanyAdmin => 80,
            Self::TenderManager => 60,
            Self::Evaluator => 40,
            Self::User => 20,
        }
    }

    pub fn at_least(self, required: Role) -> bool {
        self.level() >= required.level()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::CompanyAdmin => "company_admin",
            Self::TenderManager => "tender_manager",
            Self::Evaluator => "evaluator",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "company_admin" => Some(Self::CompanyAdmin),
            "tender_manager" => Some(Self::TenderManager),
            "evaluator" => Some(Self::Evaluator),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// The authenticated caller of a lifecycle operation. Authentication itself happens upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub company_id: Option<CompanyId>,
    pub role: Role,
}

impl Actor {
    pub const SYSTEM_USER: &'static str = "system";

    pub fn new(user_id: impl Into<String>, company_id: Option<&str>, role: Role) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            company_id: company_id.map(|id| CompanyId(id.to_string())),
            role,
        }
    }

    /// Identity used by scheduled sweeps and the award worker.
    pub fn system() -> Self {
        Self { user_id: UserId(Self::SYSTEM_USER.to_string()), company_id: None, role: Role::Admin }
    }

    pub fn is_system(&self) -> bool {
        self.user_id.0 == Self::SYSTEM_USER && self.role == Role::Admin
    }

    pub fn belongs_to(&self, company_id: &CompanyId) -> bool {
        self.company_id.as_ref() == Some(company_id)
    }
}
