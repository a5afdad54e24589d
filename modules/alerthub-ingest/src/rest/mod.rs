pub mod events;
pub mod oncall;
pub mod organizations;
