//! Handler registry, kept in lock-step with the tool manifest.

use std::collections::HashMap;
use std::sync::Arc;

use parley_protocol::{manifest, ToolName, ToolSpec};

use crate::calendar::{
    CalendarCreateEvent, CalendarDeleteEvent, CalendarListEvents, CalendarUpdateEvent,
};
use crate::handler::{ServiceClient, ToolHandler};
use crate::macros::MacroLookup;
use crate::mail::{MailList, MailRead};
use crate::memory::{MemoryRead, MemoryWrite};
use crate::search::{CodeSearch, ConversationSearch, WebSearch};

/// Base URLs for the external services the handlers call.
#[derive(Debug, Clone, Default)]
pub struct ServiceEndpoints {
    pub memory: String,
    pub macros: String,
    pub search: String,
    pub conversations: String,
    pub code: String,
    pub calendar: String,
    pub mail: String,
}

/// Maps every [`ToolName`] to its handler.
pub struct ToolRegistry {
    handlers: HashMap<ToolName, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Builds the full handler set. The match below is exhaustive over
    /// [`ToolName`], so adding a manifest entry without a handler fails to
    /// compile rather than silently never completing.
    pub fn new(endpoints: &ServiceEndpoints) -> Self {
        let mut handlers: HashMap<ToolName, Arc<dyn ToolHandler>> = HashMap::new();
        for name in ToolName::ALL {
            let handler: Arc<dyn ToolHandler> = match name {
                ToolName::MemoryRead => {
                    Arc::new(MemoryRead::new(ServiceClient::new(&endpoints.memory)))
                }
                ToolName::MemoryWrite => {
                    Arc::new(MemoryWrite::new(ServiceClient::new(&endpoints.memory)))
                }
                ToolName::MacroLookup => {
                    Arc::new(MacroLookup::new(ServiceClient::new(&endpoints.macros)))
                }
                ToolName::WebSearch => {
                    Arc::new(WebSearch::new(ServiceClient::new(&endpoints.search)))
                }
                ToolName::ConversationSearch => Arc::new(ConversationSearch::new(
                    ServiceClient::new(&endpoints.conversations),
                )),
                ToolName::CodeSearch => {
                    Arc::new(CodeSearch::new(ServiceClient::new(&endpoints.code)))
                }
                ToolName::CalendarListEvents => Arc::new(CalendarListEvents::new(
                    ServiceClient::new(&endpoints.calendar),
                )),
                ToolName::CalendarCreateEvent => Arc::new(CalendarCreateEvent::new(
                    ServiceClient::new(&endpoints.calendar),
                )),
                ToolName::CalendarUpdateEvent => Arc::new(CalendarUpdateEvent::new(
                    ServiceClient::new(&endpoints.calendar),
                )),
                ToolName::CalendarDeleteEvent => Arc::new(CalendarDeleteEvent::new(
                    ServiceClient::new(&endpoints.calendar),
                )),
                ToolName::MailList => Arc::new(MailList::new(ServiceClient::new(&endpoints.mail))),
                ToolName::MailRead => Arc::new(MailRead::new(ServiceClient::new(&endpoints.mail))),
            };
            handlers.insert(*name, handler);
        }
        Self { handlers }
    }

    pub fn handler(&self, name: ToolName) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(&name).cloned()
    }

    /// The manifest advertised in the session update.
    pub fn manifest(&self) -> Vec<ToolSpec> {
        manifest()
    }
}
