pub mod conversation;
pub mod menu;
pub mod order;
pub mod tenant;
