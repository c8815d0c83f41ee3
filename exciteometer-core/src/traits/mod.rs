pub mod capture_device;
pub mod estimator;
pub mod session_control;
pub mod session_delegate;
