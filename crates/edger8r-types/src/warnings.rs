use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Policy-configurable diagnostic classes, plus the two meta options
/// `all` (`-Wall`) and `error` (`-Werror`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Warning {
    All,
    Error,
    ForeignTypePtr,
    NonPortableType,
    PtrInStruct,
    PtrInFunction,
    ReturnPtr,
    SignedSizeOrCount,
    UnsupportedAllow,
}

impl Warning {
    /// Parse a `-W` option tag. Returns `None` for unknown tags.
    pub fn parse(tag: &str) -> Option<Warning> {
        Some(match tag {
            "all" => Warning::All,
            "error" => Warning::Error,
            "foreign-type-ptr" => Warning::ForeignTypePtr,
            "non-portable-type" => Warning::NonPortableType,
            "ptr-in-struct" => Warning::PtrInStruct,
            "ptr-in-function" => Warning::PtrInFunction,
            "return-ptr" => Warning::ReturnPtr,
            "signed-size-or-count" => Warning::SignedSizeOrCount,
            "unsupported-allow" => Warning::UnsupportedAllow,
            _ => return None,
        })
    }

    /// The `-W` tag for this diagnostic, as shown in messages.
    pub fn tag(self) -> &'static str {
        match self {
            Warning::All => "all",
            Warning::Error => "error",
            Warning::ForeignTypePtr => "foreign-type-ptr",
            Warning::NonPortableType => "non-portable-type",
            Warning::PtrInStruct => "ptr-in-struct",
            Warning::PtrInFunction => "ptr-in-function",
            Warning::ReturnPtr => "return-ptr",
            Warning::SignedSizeOrCount => "signed-size-or-count",
            Warning::UnsupportedAllow => "unsupported-allow",
        }
    }
}

/// The state of one warning option.
///
/// Priority from high to low: `Ignore`, `Error`, `Warning`, `Unset`.
/// Later command-line flags override earlier ones only by promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningState {
    Ignore,
    Warning,
    Error,
    Unset,
}

impl WarningState {
    fn rank(self) -> u8 {
        match self {
            WarningState::Ignore => 3,
            WarningState::Error => 2,
            WarningState::Warning => 1,
            WarningState::Unset => 0,
        }
    }

    /// Returns `true` if `self` may replace `other` (strictly higher
    /// priority).
    pub fn overrides(self, other: WarningState) -> bool {
        self.rank() > other.rank()
    }
}

/// How a diagnostic should be handled after resolving the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Suppressed.
    Off,
    /// Printed as a warning.
    Warn,
    /// Promoted to a fatal error.
    Error,
}

/// The per-run warning policy: one state per option, folded from the
/// command line with promotion-only overrides.
#[derive(Debug, Clone)]
pub struct WarningPolicy {
    states: HashMap<Warning, WarningState>,
}

impl Default for WarningPolicy {
    /// The default policy: `non-portable-type` and `signed-size-or-count`
    /// on, everything else unset.
    fn default() -> Self {
        let mut states = HashMap::new();
        states.insert(Warning::Error, WarningState::Unset);
        states.insert(Warning::All, WarningState::Unset);
        states.insert(Warning::NonPortableType, WarningState::Warning);
        states.insert(Warning::SignedSizeOrCount, WarningState::Warning);
        Self { states }
    }
}

impl WarningPolicy {
    /// Fold one command-line option into the policy. The new state wins
    /// only when it has strictly higher priority than the current one
    /// (`-Wno-` beats `-Werror=` beats `-W`).
    pub fn set(&mut self, warning: Warning, state: WarningState) {
        match self.states.get(&warning) {
            None => {
                self.states.insert(warning, state);
            }
            Some(&current) if state.overrides(current) => {
                self.states.insert(warning, state);
            }
            Some(_) => {}
        }
    }

    /// The explicit state of one option (`Unset` when never mentioned).
    pub fn state(&self, warning: Warning) -> WarningState {
        self.states
            .get(&warning)
            .copied()
            .unwrap_or(WarningState::Unset)
    }

    /// Resolve a diagnostic class against the policy, applying the
    /// `-Wall` master and the `-Werror` promotion rule.
    pub fn resolve(&self, warning: Warning) -> Resolution {
        let state = self.state(warning);

        if state == WarningState::Ignore {
            return Resolution::Off;
        }

        // `-Wall` turns on every unset diagnostic.
        if state == WarningState::Unset && self.state(Warning::All) != WarningState::Warning {
            return Resolution::Off;
        }

        // `-Werror` promotes everything that is on; `-Werror=<tag>`
        // promotes just that tag.
        if state == WarningState::Error || self.state(Warning::Error) == WarningState::Warning {
            Resolution::Error
        } else {
            Resolution::Warn
        }
    }
}
