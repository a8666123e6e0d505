//! Protocol method name constants.

// Lifecycle
/// Initialize method.
pub const INITIALIZE: &str = "initialize";
/// Initialized notification.
pub const INITIALIZED: &str = "notifications/initialized";

// Notifications a server may push
/// Tools list changed notification.
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
/// Log message notification.
pub const LOG_MESSAGE: &str = "notifications/message";

// Tools
/// List tools method.
pub const TOOLS_LIST: &str = "tools/list";
/// Call tool method.
pub const TOOLS_CALL: &str = "tools/call";

// Ping
/// Ping method.
pub const PING: &str = "ping";
