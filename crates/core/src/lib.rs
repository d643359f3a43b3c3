pub mod limit_key;
pub mod realm;
pub mod stats;
pub mod types;

pub use limit_key::{REALM_QUOTA_SCOPE, quota_key};
pub use realm::{ModelOutputs, Realm};
pub use stats::{DailyStat, RatioStats};
pub use types::RealmId;
