//! Per-user query context.
//!
//! A `UserContext` carries the identifiers a caller is allowed to query
//! under. Named bind parameters in generated SQL are filled exclusively
//! from this context, so one user's queries can never be bound with
//! another user's identifiers. Card numbers in result sets are masked
//! before they leave the process.

use crate::bind::BindParameter;
use crate::db::Value;
use crate::error::{PilotError, Result};
use serde::{Deserialize, Serialize};

/// Identifiers the current caller may bind into queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<i64>,
}

impl UserContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account_id(mut self, id: i64) -> Self {
        self.account_id = Some(id);
        self
    }

    pub fn with_customer_id(mut self, id: i64) -> Self {
        self.customer_id = Some(id);
        self
    }

    pub fn with_person_id(mut self, id: i64) -> Self {
        self.person_id = Some(id);
        self
    }

    /// Looks up the value for a named parameter. Parameter names are
    /// matched case-insensitively.
    pub fn value_for(&self, name: &str) -> Option<Value> {
        let id = match name.to_ascii_lowercase().as_str() {
            "accountid" | "account_id" => self.account_id,
            "customerid" | "customer_id" => self.customer_id,
            "personid" | "person_id" => self.person_id,
            _ => None,
        };
        id.map(Value::Int)
    }

    /// Returns true if the name refers to a context identifier at all,
    /// whether or not this context can supply it.
    pub fn is_context_parameter(name: &str) -> bool {
        matches!(
            name.to_ascii_lowercase().as_str(),
            "accountid" | "account_id" | "customerid" | "customer_id" | "personid" | "person_id"
        )
    }

    /// Produces bind values for the given parameters, in order.
    ///
    /// Every parameter must be named and resolvable from this context.
    /// A query that names an identifier the caller cannot supply is
    /// rejected rather than bound with a NULL or a guess.
    pub fn bind_values(&self, parameters: &[BindParameter]) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(parameters.len());
        for param in parameters {
            let Some(name) = param.name.as_deref() else {
                return Err(PilotError::unsafe_query(
                    "positional parameters cannot be filled from user context",
                ));
            };
            match self.value_for(name) {
                Some(value) => values.push(value),
                None => {
                    let reason = if Self::is_context_parameter(name) {
                        format!("parameter '{name}' is not available in this user context")
                    } else {
                        format!("parameter '{name}' is not a user context identifier")
                    };
                    return Err(PilotError::unsafe_query(reason));
                }
            }
        }
        Ok(values)
    }

    pub fn is_empty(&self) -> bool {
        self.account_id.is_none() && self.customer_id.is_none() && self.person_id.is_none()
    }
}

impl std::fmt::Display for UserContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = self.account_id {
            parts.push(format!("AccountID={id}"));
        }
        if let Some(id) = self.customer_id {
            parts.push(format!("CustomerID={id}"));
        }
        if let Some(id) = self.person_id {
            parts.push(format!("PersonID={id}"));
        }
        if parts.is_empty() {
            write!(f, "(no user context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Masks a card number, keeping only the last four digits.
///
/// Non-digit characters are ignored when locating the tail, so both
/// `4532015112830366` and `4532-0151-1283-0366` mask to
/// `XXXX-XXXX-XXXX-0366`. Values with fewer than four digits are
/// masked entirely.
pub fn mask_card_number(raw: &str) -> String {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "XXXX-XXXX-XXXX-XXXX".to_string();
    }
    let last_four: String = digits[digits.len() - 4..].iter().collect();
    format!("XXXX-XXXX-XXXX-{last_four}")
}

/// Column names whose values are card numbers and must be masked.
pub fn is_card_column(column_name: &str) -> bool {
    let lower = column_name.to_ascii_lowercase();
    lower.contains("cardnumber") || lower.contains("card_number")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn named(name: &str) -> BindParameter {
        BindParameter {
            name: Some(name.to_string()),
            position: None,
            style: format!(":{name}"),
        }
    }

    #[test]
    fn test_value_lookup_is_case_insensitive() {
        let ctx = UserContext::new().with_customer_id(42);
        assert_eq!(ctx.value_for("CustomerID"), Some(Value::Int(42)));
        assert_eq!(ctx.value_for("customerid"), Some(Value::Int(42)));
        assert_eq!(ctx.value_for("customer_id"), Some(Value::Int(42)));
        assert_eq!(ctx.value_for("AccountID"), None);
    }

    #[test]
    fn test_bind_values_in_parameter_order() {
        let ctx = UserContext::new().with_account_id(7).with_customer_id(3);
        let values = ctx
            .bind_values(&[named("CustomerID"), named("AccountID")])
            .unwrap();
        assert_eq!(values, vec![Value::Int(3), Value::Int(7)]);
    }

    #[test]
    fn test_missing_context_identifier_is_rejected() {
        let ctx = UserContext::new().with_customer_id(3);
        let err = ctx.bind_values(&[named("AccountID")]).unwrap_err();
        assert!(err.to_string().contains("not available"));
    }

    #[test]
    fn test_unknown_parameter_name_is_rejected() {
        let ctx = UserContext::new().with_customer_id(3);
        let err = ctx.bind_values(&[named("target_customer")]).unwrap_err();
        assert!(err.to_string().contains("not a user context identifier"));
    }

    #[test]
    fn test_positional_parameter_is_rejected() {
        let ctx = UserContext::new().with_customer_id(3);
        let positional = BindParameter {
            name: None,
            position: Some(1),
            style: "?".to_string(),
        };
        let err = ctx.bind_values(&[positional]).unwrap_err();
        assert!(err.to_string().contains("positional"));
    }

    #[test]
    fn test_mask_card_number_keeps_last_four() {
        assert_eq!(mask_card_number("4532015112830366"), "XXXX-XXXX-XXXX-0366");
        assert_eq!(
            mask_card_number("4532-0151-1283-0366"),
            "XXXX-XXXX-XXXX-0366"
        );
    }

    #[test]
    fn test_mask_short_value_entirely() {
        assert_eq!(mask_card_number("123"), "XXXX-XXXX-XXXX-XXXX");
        assert_eq!(mask_card_number(""), "XXXX-XXXX-XXXX-XXXX");
    }

    #[test]
    fn test_card_column_detection() {
        assert!(is_card_column("CardNumber"));
        assert!(is_card_column("card_number"));
        assert!(!is_card_column("AccountNumber"));
    }

    #[test]
    fn test_display_omits_missing_ids() {
        let ctx = UserContext::new().with_customer_id(5);
        assert_eq!(ctx.to_string(), "CustomerID=5");
        assert_eq!(UserContext::new().to_string(), "(no user context)");
    }
}
