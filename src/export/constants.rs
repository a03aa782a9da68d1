// NUPN keywords, pragmas and file conventions

pub const NL: &str = "\n";
pub const WS: &str = " ";
pub const HK: &str = "#";
pub const DOTS: &str = "...";

pub const PLACES: &str = "places";
pub const INIT_PLACE: &str = "initial place";
pub const INIT_PLACES: &str = "initial places";
pub const UNITS: &str = "units";
pub const ROOT_UNIT: &str = "root unit";
pub const TRANSITIONS: &str = "transitions";
pub const UNIT_PREFIX: &str = "U";
pub const TRANSITION_PREFIX: &str = "T";
pub const PLACE_LABEL_PREFIX: &str = "P";
pub const TRANSITION_LABEL_PREFIX: &str = "T";

pub const PRAGMA_CREATOR: &str = "!creator";
pub const PRAGMA_UNIT_SAFE: &str = "!unit_safe";
pub const PRAGMA_MULTIPLE_INIT_TOKENS: &str = "!multiple_initial_tokens";
pub const PRAGMA_LABELS: &str = "!labels";

pub const CREATOR_NAME: &str = "pnml2nupn";

pub const NUPN_EXT: &str = ".nupn";
pub const TRANS_EXT: &str = ".trans";
pub const PLACES_EXT: &str = ".places";
pub const CAMI_EXT: &str = ".cami";

/// Byte budget a writer accumulates before hitting its file
pub const WRITE_BUFFER_SIZE: usize = 64 * 1024;
