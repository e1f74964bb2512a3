mod classifier;
mod derive;
mod platform;

pub use self::classifier::{classify, ClassifierConfig, DropReason};
pub use self::derive::{AddressDeriver, Sha256Deriver};
pub use self::platform::{detect_platform, resolve, resolve_accounts};
