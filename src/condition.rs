//! Policy condition evaluator.
//!
//! A [`PolicyCondition`] is one named, statically declared requirement
//! attached to a protected action. Evaluation is a pure function of
//! (condition, context): no side effects, no external lookups. Data-driven
//! outcomes come back as [`ConditionCheck`]; a [`ConditionError`] means the
//! condition could not be evaluated at all (missing context field, malformed
//! expression) and is handled fail-closed by the matcher.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{Duration, FixedOffset, NaiveTime};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::TenantContext;
use crate::expr::{Expression, ExpressionError, Value, VariableScope};

/// One allowlist entry: a single address or a CIDR block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpRule {
    Addr(IpAddr),
    Net(IpNet),
}

impl IpRule {
    pub fn matches(&self, ip: IpAddr) -> bool {
        match self {
            IpRule::Addr(addr) => *addr == ip,
            IpRule::Net(net) => net.contains(&ip),
        }
    }
}

impl FromStr for IpRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains('/') {
            s.parse::<IpNet>()
                .map(IpRule::Net)
                .map_err(|e| format!("invalid CIDR '{s}': {e}"))
        } else {
            s.parse::<IpAddr>()
                .map(IpRule::Addr)
                .map_err(|e| format!("invalid IP address '{s}': {e}"))
        }
    }
}

impl fmt::Display for IpRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpRule::Addr(addr) => write!(f, "{addr}"),
            IpRule::Net(net) => write!(f, "{net}"),
        }
    }
}

/// Outcome of evaluating a single condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionCheck {
    pub met: bool,
    /// Diagnostic for the boundary layer's logs, not for end users.
    pub detail: String,
}

impl ConditionCheck {
    fn met(detail: impl Into<String>) -> Self {
        Self {
            met: true,
            detail: detail.into(),
        }
    }

    fn unmet(detail: impl Into<String>) -> Self {
        Self {
            met: false,
            detail: detail.into(),
        }
    }
}

/// A condition that could not be evaluated. Distinct from an unmet condition:
/// the matcher turns these into fail-closed denials with their own category.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("context is missing required field '{field}' for condition '{condition}'")]
    ContextIncomplete {
        condition: &'static str,
        field: &'static str,
    },

    #[error("invalid parameter for condition '{condition}': {detail}")]
    InvalidParameter {
        condition: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

/// A single named requirement, declared statically alongside a permission
/// requirement and never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PolicyCondition {
    /// Met iff the subject's subscription is active.
    SubscriptionActive,
    /// Met iff the subject's email address is verified.
    EmailVerified,
    /// Met iff the request's local time-of-day falls within `[start, end)`
    /// at the configured UTC offset. `end < start` wraps across midnight;
    /// `start == end` is an empty window and never met.
    BusinessHours {
        start: NaiveTime,
        end: NaiveTime,
        utc_offset_minutes: i32,
    },
    /// Met iff the request IP matches an entry. An empty list denies.
    IpAllowlist { rules: Vec<IpRule> },
    /// Met iff the subject's account is at most `trial_days` old. Refuses to
    /// evaluate when the account creation time is unknown.
    WithinTrialPeriod { trial_days: u32 },
    /// Met iff the custom-rule expression evaluates to true over the
    /// request context. See [`crate::expr`] for the grammar.
    CustomExpression { source: String },
}

impl PolicyCondition {
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyCondition::SubscriptionActive => "subscription-active",
            PolicyCondition::EmailVerified => "email-verified",
            PolicyCondition::BusinessHours { .. } => "business-hours",
            PolicyCondition::IpAllowlist { .. } => "ip-allowlist",
            PolicyCondition::WithinTrialPeriod { .. } => "within-trial-period",
            PolicyCondition::CustomExpression { .. } => "custom-expression",
        }
    }

    /// Evaluates the condition against a request context.
    pub fn evaluate(&self, context: &TenantContext) -> Result<ConditionCheck, ConditionError> {
        match self {
            PolicyCondition::SubscriptionActive => Ok(if context.subscription_active {
                ConditionCheck::met("subscription is active")
            } else {
                ConditionCheck::unmet("subscription is not active")
            }),

            PolicyCondition::EmailVerified => Ok(if context.email_verified {
                ConditionCheck::met("email address is verified")
            } else {
                ConditionCheck::unmet("email address is not verified")
            }),

            PolicyCondition::BusinessHours {
                start,
                end,
                utc_offset_minutes,
            } => {
                let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
                    ConditionError::InvalidParameter {
                        condition: "business-hours",
                        detail: format!("UTC offset of {utc_offset_minutes} minutes is out of range"),
                    }
                })?;
                let local = context.request_time.with_timezone(&offset).time();
                let met = if start < end {
                    local >= *start && local < *end
                } else if start > end {
                    // Window wraps midnight.
                    local >= *start || local < *end
                } else {
                    false
                };
                Ok(ConditionCheck {
                    met,
                    detail: format!("local time {local} against window [{start}, {end})"),
                })
            }

            PolicyCondition::IpAllowlist { rules } => {
                if rules.is_empty() {
                    // Fail closed: an empty allowlist admits nobody.
                    return Ok(ConditionCheck::unmet("IP allowlist is empty"));
                }
                let ip = context.request_ip;
                Ok(match rules.iter().find(|rule| rule.matches(ip)) {
                    Some(rule) => ConditionCheck::met(format!("{ip} matches allowlist entry {rule}")),
                    None => ConditionCheck::unmet(format!("{ip} matches no allowlist entry")),
                })
            }

            PolicyCondition::WithinTrialPeriod { trial_days } => {
                let created_at = context.subject_created_at.ok_or(
                    ConditionError::ContextIncomplete {
                        condition: "within-trial-period",
                        field: "subject_created_at",
                    },
                )?;
                let age = context.request_time - created_at;
                let met = age <= Duration::days(i64::from(*trial_days));
                Ok(ConditionCheck {
                    met,
                    detail: format!(
                        "account age {} days against a {trial_days}-day trial",
                        age.num_days()
                    ),
                })
            }

            PolicyCondition::CustomExpression { source } => {
                let expression = Expression::parse(source)?;
                let met = expression.evaluate(context)?;
                Ok(ConditionCheck {
                    met,
                    detail: format!("expression '{source}' evaluated to {met}"),
                })
            }
        }
    }
}

/// Context variables visible to custom-rule expressions on the
/// authorization path.
impl VariableScope for TenantContext {
    fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "role" => Some(Value::Text(self.role.as_str().to_string())),
            "role_rank" => Some(Value::Number(f64::from(self.role.rank()))),
            "subscription_active" => Some(Value::Bool(self.subscription_active)),
            "email_verified" => Some(Value::Bool(self.email_verified)),
            "subject_id" => Some(Value::Text(self.subject_id.to_string())),
            "organization_id" => Some(Value::Text(self.organization_id.to_string())),
            "request_ip" => Some(Value::Text(self.request_ip.to_string())),
            _ => None,
        }
    }
}
