/// Column and path constants shared by the readers, the fuser and the CLI.
/// The source extracts are fixed upstream formats, so these names must match them exactly.

// Indicator extract columns
pub const INDICATOR_COUNTRY_COL: &str = "REF_AREA";
pub const INDICATOR_PERIOD_COL: &str = "TIME_PERIOD";
pub const INDICATOR_METRIC_COL: &str = "Measure";
pub const INDICATOR_VALUE_COL: &str = "OBS_VALUE";

// Event extract columns
pub const EVENT_DATE_COL: &str = "event_date";
pub const EVENT_ISO_COL: &str = "iso";
pub const EVENT_COUNTRY_COL: &str = "country";
pub const EVENT_ADMIN1_COL: &str = "admin1";
pub const EVENT_LOCATION_COL: &str = "location";
pub const EVENT_TYPE_COL: &str = "event_type";
pub const EVENT_SUB_TYPE_COL: &str = "sub_event_type";
pub const EVENT_FATALITIES_COL: &str = "fatalities";
pub const EVENT_NOTES_COL: &str = "notes";

// Fused panel prefix, in output order
pub const ISO_COL: &str = "iso";
pub const PERIOD_COL: &str = "year_month";
pub const INCIDENTS_COL: &str = "incidents";
pub const PREFIX_COLUMNS: [&str; 3] = [ISO_COL, PERIOD_COL, INCIDENTS_COL];

/// Suffix appended to a canonical artifact path to name its compressed sibling.
pub const XZ_EXTENSION: &str = "xz";

/// xz preset used when none is configured.
pub const DEFAULT_XZ_PRESET: u32 = 9;

pub const DEFAULT_INDICATORS_CSV: &str = "data/final/oecd.csv";
pub const DEFAULT_EVENTS_CSV: &str = "data/final/acled.csv";
pub const DEFAULT_FUSED_CSV: &str = "data/final/data.csv";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_CONFIG_FILE: &str = "panel.toml";
