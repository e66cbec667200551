use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::error::{EngineError, ValidationError};
use super::types::TaxKey;

/// Standard German output-tax keys: DE19, DE7, DE0.
pub fn german_defaults() -> Vec<TaxKey> {
    vec![
        TaxKey::new("DE19", dec!(19), "Umsatzsteuer 19 %", "VAT 19%"),
        TaxKey::new("DE7", dec!(7), "Umsatzsteuer 7 %", "VAT 7%"),
        TaxKey::new("DE0", dec!(0), "Steuerfrei 0 %", "Tax exempt 0%"),
    ]
}

/// Per-tenant reference data: tax key code → rate and descriptions.
///
/// Documents copy the keys they use at creation time, so later registry
/// changes never alter persisted totals.
#[derive(Debug, Clone, Default)]
pub struct TaxKeyRegistry {
    tenants: HashMap<String, BTreeMap<String, TaxKey>>,
}

impl TaxKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the German default keys registered for `tenant`.
    pub fn with_german_defaults(tenant: impl Into<String>) -> Self {
        let tenant = tenant.into();
        let mut registry = Self::new();
        let keys = registry.tenants.entry(tenant).or_default();
        for key in german_defaults() {
            keys.insert(key.key.clone(), key);
        }
        registry
    }

    /// Register or replace a key for a tenant.
    pub fn register(&mut self, tenant: impl Into<String>, key: TaxKey) -> Result<(), EngineError> {
        let errors = validate_tax_key(&key, "tax_key");
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }
        self.tenants
            .entry(tenant.into())
            .or_default()
            .insert(key.key.clone(), key);
        Ok(())
    }

    pub fn get(&self, tenant: &str, key: &str) -> Option<&TaxKey> {
        self.tenants.get(tenant).and_then(|keys| keys.get(key))
    }

    /// All keys of a tenant, ordered by code.
    pub fn keys_for(&self, tenant: &str) -> Vec<TaxKey> {
        self.tenants
            .get(tenant)
            .map(|keys| keys.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Resolve the given codes into the tax-key set a new document carries.
    pub fn resolve(&self, tenant: &str, codes: &[&str]) -> Result<Vec<TaxKey>, EngineError> {
        let mut resolved = Vec::with_capacity(codes.len());
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for (i, code) in codes.iter().enumerate() {
            if !seen.insert(*code) {
                continue;
            }
            match self.get(tenant, code) {
                Some(key) => resolved.push(key.clone()),
                None => errors.push(ValidationError::with_rule(
                    format!("tax_keys[{i}]"),
                    format!("tax key '{code}' is not registered for tenant '{tenant}'"),
                    "TAX-KEY-UNKNOWN",
                )),
            }
        }
        if errors.is_empty() {
            Ok(resolved)
        } else {
            Err(EngineError::Validation(errors))
        }
    }
}

/// Validate a document's tax-key set: well-formed keys, no duplicates.
pub fn validate_tax_keys(keys: &[TaxKey]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (i, key) in keys.iter().enumerate() {
        let path = format!("tax_keys[{i}]");
        errors.extend(validate_tax_key(key, &path));
        if !seen.insert(key.key.as_str()) {
            errors.push(ValidationError::with_rule(
                format!("{path}.key"),
                format!("tax key '{}' is listed more than once", key.key),
                "TAX-KEY-DUPLICATE",
            ));
        }
    }
    errors
}

fn validate_tax_key(key: &TaxKey, path: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if key.key.trim().is_empty() {
        errors.push(ValidationError::new(
            format!("{path}.key"),
            "tax key code must not be empty",
        ));
    }
    if key.rate_pct < Decimal::ZERO || key.rate_pct > dec!(100) {
        errors.push(ValidationError::with_rule(
            format!("{path}.rate_pct"),
            format!("rate {} must be between 0 and 100", key.rate_pct),
            "TAX-RATE-RANGE",
        ));
    }
    errors
}
