pub mod activity;
pub mod alert;
pub mod battery;
pub mod dashboard;
pub mod device;
pub mod location;
pub mod reflector;
pub mod sensor;
pub mod user;

pub use activity::*;
pub use alert::*;
pub use battery::*;
pub use dashboard::*;
pub use device::*;
pub use location::*;
pub use reflector::*;
pub use sensor::*;
pub use user::*;
