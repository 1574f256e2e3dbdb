pub mod helpers;
pub mod kubernetes;
pub mod protocol;
pub mod resources;
pub mod stamp;
pub mod version;

pub const DEFAULT_STAMP_DIRECTORY: &str = "/var/housekeeper";
pub const DEFAULT_AGENT_PORT: u16 = 54444;

pub const OPERATOR_CLUSTERROLE_NAME: &str = "housekeeper-operator";
