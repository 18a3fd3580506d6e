//! Chat identity model and canonicalization.
//!
//! The same WhatsApp user can reach the bot under several spellings: a bare
//! phone number typed by the owner (`0812...`, `+62 812...`), a direct chat
//! address (`62812...@s.whatsapp.net`, optionally with a `:device` part) or
//! an opaque linked-device address (`...@lid`). Every piece of per-user
//! security state is keyed by the canonical forms produced here, so a block
//! or allow-list entry cannot be dodged by switching address format.
//!
//! ## Invariants
//!
//! - [`normalize`] is deterministic: the same raw input always yields the
//!   same ordered set of forms.
//! - Re-normalizing any returned form yields a subset of the original set.
//! - Empty or digit-less input yields an empty set.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Suffix of a direct chat address. Also the default suffix appended to
/// bare numbers.
pub const DIRECT_SUFFIX: &str = "@s.whatsapp.net";

/// Suffix of a linked-device (opaque) address.
pub const LINKED_SUFFIX: &str = "@lid";

/// Country code used when none is configured.
const DEFAULT_COUNTRY_CODE: &str = "62";

// ---------------------------------------------------------------------------
// Canonical ids
// ---------------------------------------------------------------------------

/// A canonical identity string used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

impl CanonicalId {
    /// Borrow the underlying key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the owned key.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CanonicalId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CanonicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Identity variants
// ---------------------------------------------------------------------------

/// A parsed chat identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// A bare phone number (digits only) with no address suffix.
    Phone(String),
    /// A direct chat address; holds the digits of the user part.
    DirectChat(String),
    /// A linked-device address; holds the opaque user part verbatim.
    LinkedDevice(String),
}

impl Identity {
    /// Classify a raw identifier. Returns `None` for input that carries no
    /// usable user part.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some(user) = raw.strip_suffix(LINKED_SUFFIX) {
            let user = strip_device(user);
            return (!user.is_empty()).then(|| Identity::LinkedDevice(user.to_string()));
        }

        if let Some(user) = raw.strip_suffix(DIRECT_SUFFIX) {
            let digits = digits_of(strip_device(user));
            return (!digits.is_empty()).then_some(Identity::DirectChat(digits));
        }

        // Anything else: take the user part of an unknown address, or the
        // whole string for a typed phone number.
        let user = raw.split('@').next().unwrap_or(raw);
        let digits = digits_of(strip_device(user));
        (!digits.is_empty()).then_some(Identity::Phone(digits))
    }

    /// Whether the raw form carried one of the recognised address suffixes.
    pub fn is_suffixed(&self) -> bool {
        !matches!(self, Identity::Phone(_))
    }

    /// Digits of the user part. Empty for a non-numeric linked-device id.
    pub fn digits(&self) -> String {
        match self {
            Identity::Phone(d) | Identity::DirectChat(d) => d.clone(),
            Identity::LinkedDevice(opaque) => digits_of(opaque),
        }
    }
}

fn strip_device(user: &str) -> &str {
    user.split(':').next().unwrap_or(user)
}

fn digits_of(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Regional rewrite applied to numbers with a trunk prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeRules {
    /// Country code that replaces a single leading `0`.
    pub country_code: String,
}

impl NormalizeRules {
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
        }
    }

    /// Replace a single leading `0` with the country code.
    pub fn rewrite(&self, digits: &str) -> String {
        match digits.strip_prefix('0') {
            Some(rest) => format!("{}{rest}", self.country_code),
            None => digits.to_string(),
        }
    }
}

impl Default for NormalizeRules {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_CODE)
    }
}

/// The ordered, de-duplicated canonical forms of one raw identifier.
///
/// The first form is the primary key used by the registry, the allow-list
/// and the suspicious-activity log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedId {
    forms: Vec<CanonicalId>,
}

impl NormalizedId {
    fn push(&mut self, form: String) {
        if !self.forms.iter().any(|f| f.0 == form) {
            self.forms.push(CanonicalId(form));
        }
    }

    /// The primary canonical form, if any.
    pub fn primary(&self) -> Option<&CanonicalId> {
        self.forms.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalId> {
        self.forms.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn contains(&self, form: &str) -> bool {
        self.forms.iter().any(|f| f.0 == form)
    }

    /// Consume into the list of forms.
    pub fn into_vec(self) -> Vec<CanonicalId> {
        self.forms
    }
}

/// Canonicalize a raw identifier into every equivalent map key.
///
/// The result contains the raw string itself when it already carries a
/// recognised suffix, the regionally rewritten number with the default
/// suffix, and the un-rewritten number with the default suffix when the
/// rewrite changed it. For a linked-device address the device-less address
/// is the primary form; otherwise the rewritten number is.
pub fn normalize(raw: &str, rules: &NormalizeRules) -> NormalizedId {
    let raw = raw.trim();
    let mut out = NormalizedId::default();
    let Some(identity) = Identity::parse(raw) else {
        return out;
    };

    if let Identity::LinkedDevice(user) = &identity {
        out.push(format!("{user}{LINKED_SUFFIX}"));
        out.push(raw.to_string());
    }

    let digits = identity.digits();
    if !digits.is_empty() {
        let rewritten = rules.rewrite(&digits);
        out.push(format!("{rewritten}{DIRECT_SUFFIX}"));
        if rewritten != digits {
            out.push(format!("{digits}{DIRECT_SUFFIX}"));
        }
    }

    if matches!(identity, Identity::DirectChat(_)) {
        out.push(raw.to_string());
    }

    out
}

// ---------------------------------------------------------------------------
// Owner predicate
// ---------------------------------------------------------------------------

/// The configured owner identities in every canonical spelling.
#[derive(Debug, Clone)]
pub struct OwnerSet {
    raw: Vec<String>,
    forms: Vec<CanonicalId>,
    rules: NormalizeRules,
}

impl OwnerSet {
    /// Build the owner set from configured raw ids.
    pub fn new(owners: &[String], rules: NormalizeRules) -> Self {
        let raw: Vec<String> = owners
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        let mut forms: Vec<CanonicalId> = Vec::new();
        for owner in &raw {
            for form in normalize(owner, &rules).into_vec() {
                if !forms.contains(&form) {
                    forms.push(form);
                }
            }
        }
        Self { raw, forms, rules }
    }

    /// Whether `raw` names an owner, directly or through any canonical form.
    pub fn is_owner(&self, raw: &str) -> bool {
        let raw = raw.trim();
        if raw.is_empty() {
            return false;
        }
        let mut found = self.raw.iter().any(|o| ct_str_eq(o, raw));
        for form in normalize(raw, &self.rules).iter() {
            if self.matches_form(form.as_str()) {
                found = true;
            }
        }
        found
    }

    /// Check a single form against every owner form.
    ///
    /// Iterates all entries so the number of owners does not leak through
    /// timing.
    fn matches_form(&self, form: &str) -> bool {
        let mut found = false;
        for owner in &self.forms {
            if ct_str_eq(owner.as_str(), form) {
                found = true;
            }
        }
        found
    }

    /// Configured raw owner ids.
    pub fn raw_ids(&self) -> &[String] {
        &self.raw
    }

    /// Every canonical form of every owner.
    pub fn forms(&self) -> &[CanonicalId] {
        &self.forms
    }

    pub fn rules(&self) -> &NormalizeRules {
        &self.rules
    }

    /// Normalize with the same rules the owner set was built with.
    pub fn normalize(&self, raw: &str) -> NormalizedId {
        normalize(raw, &self.rules)
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

fn ct_str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn forms(raw: &str) -> Vec<String> {
        normalize(raw, &NormalizeRules::default())
            .into_vec()
            .into_iter()
            .map(CanonicalId::into_string)
            .collect()
    }

    #[test]
    fn parse_classifies_address_formats() {
        assert_eq!(
            Identity::parse("628123@s.whatsapp.net"),
            Some(Identity::DirectChat("628123".into()))
        );
        assert_eq!(
            Identity::parse("628123:14@s.whatsapp.net"),
            Some(Identity::DirectChat("628123".into()))
        );
        assert_eq!(
            Identity::parse("1234567@lid"),
            Some(Identity::LinkedDevice("1234567".into()))
        );
        assert_eq!(
            Identity::parse("+62 812-3456"),
            Some(Identity::Phone("628123456".into()))
        );
        assert_eq!(Identity::parse(""), None);
        assert_eq!(Identity::parse("   "), None);
        assert_eq!(Identity::parse("abc"), None);
        assert_eq!(Identity::parse("@s.whatsapp.net"), None);
    }

    #[test]
    fn bare_number_with_trunk_prefix_yields_both_spellings() {
        assert_eq!(
            forms("08123456789"),
            vec!["628123456789@s.whatsapp.net", "08123456789@s.whatsapp.net"]
        );
    }

    #[test]
    fn international_number_yields_single_form() {
        assert_eq!(forms("628123456789"), vec!["628123456789@s.whatsapp.net"]);
        assert_eq!(forms("+62 812-3456-789"), vec!["628123456789@s.whatsapp.net"]);
    }

    #[test]
    fn direct_address_is_kept_verbatim() {
        assert_eq!(
            forms("628123456789@s.whatsapp.net"),
            vec!["628123456789@s.whatsapp.net"]
        );
        assert_eq!(
            forms("628123456789:3@s.whatsapp.net"),
            vec![
                "628123456789@s.whatsapp.net",
                "628123456789:3@s.whatsapp.net"
            ]
        );
    }

    #[test]
    fn linked_device_primary_is_verbatim() {
        let n = normalize("99887766@lid", &NormalizeRules::default());
        assert_eq!(n.primary().map(CanonicalId::as_str), Some("99887766@lid"));
        assert!(n.contains("99887766@s.whatsapp.net"));
    }

    #[test]
    fn linked_device_drops_device_part_for_primary() {
        let n = normalize("99887766:4@lid", &NormalizeRules::default());
        assert_eq!(n.primary().map(CanonicalId::as_str), Some("99887766@lid"));
        assert!(n.contains("99887766:4@lid"));
    }

    #[test]
    fn empty_and_garbage_yield_nothing() {
        assert!(forms("").is_empty());
        assert!(forms("not-a-number").is_empty());
    }

    #[test]
    fn normalization_is_deterministic() {
        for raw in ["0812", "628123@s.whatsapp.net", "0123@lid", "+1 (555) 0100"] {
            assert_eq!(forms(raw), forms(raw));
        }
    }

    #[test]
    fn renormalizing_a_form_never_adds_forms() {
        let rules = NormalizeRules::default();
        for raw in [
            "08123456789",
            "628123456789",
            "08123456789@s.whatsapp.net",
            "0812:7@s.whatsapp.net",
            "0123@lid",
            "abc123@lid",
            "120363001234567890@g.us",
        ] {
            let original = normalize(raw, &rules);
            for form in original.iter() {
                for again in normalize(form.as_str(), &rules).iter() {
                    assert!(
                        original.contains(again.as_str()),
                        "{raw}: re-normalizing {form} produced new form {again}"
                    );
                }
            }
        }
    }

    #[test]
    fn rewrite_uses_configured_country_code() {
        let rules = NormalizeRules::new("44");
        assert_eq!(rules.rewrite("07700900123"), "447700900123");
        assert_eq!(rules.rewrite("447700900123"), "447700900123");
        let n = normalize("07700900123", &rules);
        assert_eq!(
            n.primary().map(CanonicalId::as_str),
            Some("447700900123@s.whatsapp.net")
        );
    }

    #[test]
    fn owner_set_matches_every_spelling() {
        let owners = OwnerSet::new(&["08111222333".to_string()], NormalizeRules::default());
        assert!(owners.is_owner("08111222333"));
        assert!(owners.is_owner("628111222333"));
        assert!(owners.is_owner("628111222333@s.whatsapp.net"));
        assert!(owners.is_owner("08111222333@s.whatsapp.net"));
        assert!(owners.is_owner("628111222333:5@s.whatsapp.net"));
        assert!(!owners.is_owner("628111222334@s.whatsapp.net"));
        assert!(!owners.is_owner(""));
    }

    #[test]
    fn owner_set_accepts_linked_device_owner() {
        let owners = OwnerSet::new(&["4455@lid".to_string()], NormalizeRules::default());
        assert!(owners.is_owner("4455@lid"));
        assert!(!owners.is_owner("4456@lid"));
    }

    #[test]
    fn owner_set_ignores_blank_entries() {
        let owners = OwnerSet::new(&["  ".to_string()], NormalizeRules::default());
        assert!(owners.is_empty());
        assert!(!owners.is_owner("628"));
    }
}
