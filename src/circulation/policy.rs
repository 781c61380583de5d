//! Which lending rules apply to a person

use tracing::debug;

use crate::domain::{Person, Policy, PolicyCategory};
use crate::error::{CirculationError, Result, StoreContext};
use crate::storage::PolicyRepository;

/// Maps a member's category to a lending policy
#[derive(Clone, Copy)]
pub struct PolicyResolver<'a> {
    policies: &'a dyn PolicyRepository,
    default: PolicyCategory,
}

impl<'a> PolicyResolver<'a> {
    pub fn new(policies: &'a dyn PolicyRepository, default: PolicyCategory) -> Self {
        Self { policies, default }
    }

    pub fn default_category(&self) -> PolicyCategory {
        self.default
    }

    /// Category whose rules apply to `person`. Librarians and blank or
    /// unrecognised member categories get the default.
    pub fn category_for(&self, person: &Person) -> PolicyCategory {
        person
            .membership()
            .and_then(|m| PolicyCategory::from_member_category(&m.category))
            .unwrap_or(self.default)
    }

    /// Resolves the policy for `person`
    pub fn resolve(&self, person: &Person) -> Result<Policy> {
        let category = self.category_for(person);
        let policy = self.resolve_category(category)?;
        debug!(person = %person.id, category = %policy.category, "resolved lending policy");
        Ok(policy)
    }

    /// Looks up `category`, falling back to the default category's policy.
    ///
    /// Fails with [`CirculationError::PolicyNotFound`] when neither exists,
    /// and with [`CirculationError::InvalidPolicy`] when the stored rules
    /// are unusable.
    pub fn resolve_category(&self, category: PolicyCategory) -> Result<Policy> {
        let found = self
            .policies
            .find_by_category(category)
            .with_store_context(|| format!("Failed to load {} policy", category))?;

        let policy = match found {
            Some(policy) => policy,
            None if category != self.default => {
                debug!(%category, default = %self.default, "no policy for category, using default");
                self.policies
                    .find_by_category(self.default)
                    .with_store_context(|| format!("Failed to load {} policy", self.default))?
                    .ok_or(CirculationError::PolicyNotFound {
                        requested: category,
                        default: self.default,
                    })?
            }
            None => {
                return Err(CirculationError::PolicyNotFound {
                    requested: category,
                    default: self.default,
                })
            }
        };

        policy.validate()?;
        Ok(policy)
    }
}
