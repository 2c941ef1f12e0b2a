//! Principal/agent binding records

use crate::{Identity, Timestamp};
use serde::{Deserialize, Serialize};

/// A 1:1 binding between a principal and the agent acting for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AgentBinding {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub principal: Identity,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub agent: Identity,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub bound_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub updated_at: Option<Timestamp>,
}

impl AgentBinding {
    pub fn new(principal: Identity, agent: Identity, bound_at: Timestamp) -> Self {
        Self {
            principal,
            agent,
            bound_at,
            updated_at: None,
        }
    }

    /// The binding after swapping in `agent`, keeping the original bind time.
    pub fn replaced_with(&self, agent: Identity, now: Timestamp) -> Self {
        Self {
            principal: self.principal,
            agent,
            bound_at: self.bound_at,
            updated_at: Some(now),
        }
    }
}
