use crate::domain::actor::{Actor, CompanyId, Role};
use crate::errors::TenderError;

pub fn can_create_tender(actor: &Actor) -> bool {
    actor.role.at_least(Role::TenderManager) && actor.company_id.is_some()
}

/// Admins, or tender managers and above from the owning company.
pub fn can_administer_tender(actor: &Actor, owner: &CompanyId) -> bool {
    if actor.role == Role::Admin {
        return true;
    }
    actor.role.at_least(Role::TenderManager) && actor.belongs_to(owner)
}

pub fn require_tender_admin(actor: &Actor, owner: &CompanyId) -> Result<(), TenderError> {
    if can_administer_tender(actor, owner) {
        Ok(())
    } else {
        Err(TenderError::Forbidden(format!(
            "user `{}` may not administer tenders of company `{owner}`",
            actor.user_id
        )))
    }
}

pub fn can_submit_bid(actor: &Actor) -> bool {
    actor.company_id.is_some()
}

pub fn require_company(actor: &Actor) -> Result<&CompanyId, TenderError> {
    actor.company_id.as_ref().ok_or(TenderError::Unassigned)
}
