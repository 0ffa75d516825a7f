//! Standard subject patterns.

/// Queue group shared by every worker serving the same agent, so each
/// request is handled exactly once per group.
pub const AGENT_QUEUE_GROUP: &str = "conductor-agents";

/// Standard subject patterns for agent communication.
pub struct SubjectPatterns;

impl SubjectPatterns {
    /// Inbox for an agent (receives tasks).
    #[must_use]
    pub fn agent_inbox(agent_id: &str) -> String {
        format!("agents.{agent_id}.inbox")
    }

    /// All agent inboxes (wildcard, NATS only).
    #[must_use]
    pub fn all_agents() -> &'static str {
        "agents.*.inbox"
    }
}
