// Location paths into a PNML document carrying a NUPN toolspecific section

pub const ID_ATTR: &str = "id";
pub const SOURCE_ATTR: &str = "source";
pub const TARGET_ATTR: &str = "target";
pub const PLACES_ATTR: &str = "places";
pub const TRANSITIONS_ATTR: &str = "transitions";
pub const ARCS_ATTR: &str = "arcs";
pub const UNITS_ATTR: &str = "units";
pub const ROOT_ATTR: &str = "root";
pub const SAFE_ATTR: &str = "safe";

pub const NAME: &str = "name";
pub const TEXT: &str = "text";
pub const INITIAL_MARKING: &str = "initialMarking";
pub const INSCRIPTION: &str = "inscription";

pub const NUPN_SIZE: &str = "/pnml/net/toolspecific[@tool='nupn']/size";
pub const NUPN_STRUCTURE: &str = "/pnml/net/toolspecific[@tool='nupn']/structure";
pub const NUPN_UNIT: &str = "/pnml/net/toolspecific[@tool='nupn']/structure/unit";

pub const ALL_PLACES: &str = "/pnml/net//place";
pub const MARKED_PLACES: &str = "/pnml/net//place/initialMarking";
pub const PLACES_EXCEPT_MARKED: &str = "/pnml/net//place[not(initialMarking)]";
pub const TRANSITIONS: &str = "/pnml/net//transition";
pub const ARCS: &str = "/pnml/net//arc";

pub const COUNT_PLACES: &str = "count(/pnml/net//place)";
pub const COUNT_TRANSITIONS: &str = "count(/pnml/net//transition)";
