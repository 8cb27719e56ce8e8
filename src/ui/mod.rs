/// Popup UI modules
pub mod popup;
pub mod script_card;
