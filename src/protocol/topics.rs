// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic layout for one controller profile.

/// The six topics of a session, all prefixed with the profile id.
///
/// # Examples
///
/// ```
/// use nhc2_gateway::protocol::{Topic, Topics};
///
/// let topics = Topics::new("hobby");
/// assert_eq!(topics.response(), "hobby/rsp");
/// assert_eq!(topics.public_command(), "hobby/public/cmd");
/// assert_eq!(topics.classify("hobby/evt"), Some(Topic::Event));
/// assert_eq!(topics.classify("other/evt"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    profile_id: String,
    response: String,
    public_response: String,
    event: String,
    system_event: String,
    command: String,
    public_command: String,
}

/// Category of an inbound topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// `{profile}/rsp`
    Response,
    /// `{profile}/public/rsp`
    PublicResponse,
    /// `{profile}/evt`
    Event,
    /// `{profile}/sysevt`
    SystemEvent,
}

impl Topics {
    /// Builds the topic set for a profile.
    #[must_use]
    pub fn new(profile_id: &str) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            response: format!("{profile_id}/rsp"),
            public_response: format!("{profile_id}/public/rsp"),
            event: format!("{profile_id}/evt"),
            system_event: format!("{profile_id}/sysevt"),
            command: format!("{profile_id}/cmd"),
            public_command: format!("{profile_id}/public/cmd"),
        }
    }

    /// The profile the topics belong to.
    #[must_use]
    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    /// Generic command responses.
    #[must_use]
    pub fn response(&self) -> &str {
        &self.response
    }

    /// System information responses.
    #[must_use]
    pub fn public_response(&self) -> &str {
        &self.public_response
    }

    /// Device status and change events.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// System-level events.
    #[must_use]
    pub fn system_event(&self) -> &str {
        &self.system_event
    }

    /// Outbound commands.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Outbound public commands.
    #[must_use]
    pub fn public_command(&self) -> &str {
        &self.public_command
    }

    /// The topics subscribed after every successful connect, in order.
    #[must_use]
    pub fn subscriptions(&self) -> [&str; 4] {
        [
            &self.response,
            &self.public_response,
            &self.event,
            &self.system_event,
        ]
    }

    /// Maps an inbound topic to its category.
    #[must_use]
    pub fn classify(&self, topic: &str) -> Option<Topic> {
        if topic == self.response {
            Some(Topic::Response)
        } else if topic == self.public_response {
            Some(Topic::PublicResponse)
        } else if topic == self.event {
            Some(Topic::Event)
        } else if topic == self.system_event {
            Some(Topic::SystemEvent)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_topics_are_scoped() {
        let topics = Topics::new("p1");
        assert_eq!(topics.response(), "p1/rsp");
        assert_eq!(topics.public_response(), "p1/public/rsp");
        assert_eq!(topics.event(), "p1/evt");
        assert_eq!(topics.system_event(), "p1/sysevt");
        assert_eq!(topics.command(), "p1/cmd");
        assert_eq!(topics.public_command(), "p1/public/cmd");
    }

    #[test]
    fn classify_inbound_topics() {
        let topics = Topics::new("p1");
        assert_eq!(topics.classify("p1/rsp"), Some(Topic::Response));
        assert_eq!(topics.classify("p1/public/rsp"), Some(Topic::PublicResponse));
        assert_eq!(topics.classify("p1/sysevt"), Some(Topic::SystemEvent));
        assert_eq!(topics.classify("p1/cmd"), None);
        assert_eq!(topics.classify("p1/evt/extra"), None);
    }

    #[test]
    fn subscription_order() {
        let topics = Topics::new("p1");
        assert_eq!(
            topics.subscriptions(),
            ["p1/rsp", "p1/public/rsp", "p1/evt", "p1/sysevt"]
        );
    }
}
