// Components module - reusable UI building blocks
//
// - Message list: rendered rows, header and scrollbar
// - Preview: fields of the row under the cursor
// - Status bar: position, cache fill, fetch state
// - Logs panel: captured log entries
//
// Each component is a focused, single-responsibility module.

pub mod logs_panel;
pub mod message_list;
pub mod preview;
pub mod scrollbar;
pub mod status_bar;
