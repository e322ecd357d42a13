pub mod apply;
pub mod check;
pub mod config;
pub mod devices;
pub mod live;
