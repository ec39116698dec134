//! Core type definitions for the request filter
//!
//! These types map directly to the rules list binary format and
//! are used throughout the rules index.

// =============================================================================
// Decision (what happens to a request matched by a rule)
// =============================================================================

/// Decision taken by a filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Decision {
    /// Block (or otherwise modify) the request
    #[default]
    Modify = 0,
    /// Exception rule (@@...) - lets the request through
    Pass = 1,
    /// $important - wins over exception rules
    ModifyImportant = 2,
}

impl TryFrom<u8> for Decision {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Modify),
            1 => Ok(Self::Pass),
            2 => Ok(Self::ModifyImportant),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Modifier (which per-request alteration the rule carries)
// =============================================================================

/// Modifier carried by a filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(u8)]
pub enum Modifier {
    #[default]
    None = 0,
    /// $csp= - inject a Content-Security-Policy on the response
    Csp = 1,
    /// $redirect= / $redirect-rule= - serve a surrogate resource
    Redirect = 2,
    /// $ad-query-trigger= - ad attribution query parameters
    AdQueryTrigger = 3,
}

impl TryFrom<u8> for Modifier {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Csp),
            2 => Ok(Self::Redirect),
            3 => Ok(Self::AdQueryTrigger),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Pattern Type
// =============================================================================

/// How the pattern string of a rule is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PatternType {
    /// Literal text, no wildcards
    #[default]
    Plain = 0,
    /// Contains `*` and/or `^`
    Wildcarded = 1,
    /// /regex/
    Regexp = 2,
}

impl TryFrom<u8> for PatternType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Plain),
            1 => Ok(Self::Wildcarded),
            2 => Ok(Self::Regexp),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Anchor flags
// =============================================================================

bitflags::bitflags! {
    /// Pattern anchors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AnchorType: u8 {
        /// Left anchor (|pattern)
        const START = 1 << 0;
        /// Right anchor (pattern|)
        const END = 1 << 1;
        /// Hostname anchor (||pattern)
        const HOST = 1 << 2;
    }
}

// =============================================================================
// Party flags
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PartyFlags: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

impl PartyFlags {
    /// Party bit for a request.
    #[inline]
    pub fn for_request(is_third_party: bool) -> Self {
        if is_third_party {
            Self::THIRD_PARTY
        } else {
            Self::FIRST_PARTY
        }
    }
}

// =============================================================================
// Resource Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Resource type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceTypes: u16 {
        const STYLESHEET = 1 << 0;
        const IMAGE = 1 << 1;
        const OBJECT = 1 << 2;
        const SCRIPT = 1 << 3;
        const XMLHTTPREQUEST = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const FONT = 1 << 6;
        const MEDIA = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const WEBRTC = 1 << 9;
        const PING = 1 << 10;
        const WEBTRANSPORT = 1 << 11;
        const WEBBUNDLE = 1 << 12;
        const OTHER = 1 << 13;

        /// All resource types
        const ALL = (1 << 14) - 1;
    }
}

impl ResourceTypes {
    /// Parse from browser request type string.
    pub fn from_request_type(s: &str) -> Option<Self> {
        let value = match s {
            "stylesheet" => Self::STYLESHEET,
            "image" => Self::IMAGE,
            "object" => Self::OBJECT,
            "script" => Self::SCRIPT,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            "subdocument" | "sub_frame" => Self::SUBDOCUMENT,
            "font" => Self::FONT,
            "media" => Self::MEDIA,
            "websocket" => Self::WEBSOCKET,
            "webrtc" => Self::WEBRTC,
            "ping" => Self::PING,
            "webtransport" => Self::WEBTRANSPORT,
            "webbundle" => Self::WEBBUNDLE,
            "other" => Self::OTHER,
            _ => return None,
        };
        Some(value)
    }
}

// =============================================================================
// Activation Types
// =============================================================================

bitflags::bitflags! {
    /// Activation types toggled by $document, $elemhide, $generichide, ...
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ActivationTypes: u8 {
        /// Whole document (no filtering at all)
        const DOCUMENT = 1 << 0;
        /// Element hiding (cosmetic filtering)
        const ELEMENT_HIDE = 1 << 1;
        /// Generic element hiding
        const GENERIC_HIDE = 1 << 2;
        /// Generic network blocking
        const GENERIC_BLOCK = 1 << 3;
        /// Ad attribution tracking
        const ATTRIBUTE_ADS = 1 << 4;
    }
}

/// Activation types found for a document, split by rule decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivationsFound {
    pub in_block_rules: ActivationTypes,
    pub in_allow_rules: ActivationTypes,
}

// =============================================================================
// Rule identity
// =============================================================================

/// Weak reference to a rule inside one rule source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId {
    pub source_id: u32,
    pub rule_nr: u32,
}

impl RuleId {
    pub const fn new(source_id: u32, rule_nr: u32) -> Self {
        Self { source_id, rule_nr }
    }
}

/// Opaque key identifying a renderer process for the activation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessKey(pub u64);
