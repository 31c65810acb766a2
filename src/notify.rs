//! User-visible signals: ephemeral toasts and system notifications.

use crate::util::strip_control_chars;

pub const BACKGROUND_TITLE: &str = "New Articles Downloaded";
pub const BACKGROUND_BODY: &str = "Fresh news is available for offline reading.";

/// Sink for the two kinds of messages the pipeline emits.
pub trait Notifier: Send + Sync {
    /// Short-lived message after an interactive action.
    fn toast(&self, message: &str);

    /// System notification, posted by background sweeps.
    fn notify(&self, title: &str, body: &str);
}

/// Writes messages to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn toast(&self, message: &str) {
        println!("{}", strip_control_chars(message));
    }

    fn notify(&self, title: &str, body: &str) {
        println!("[{}] {}", strip_control_chars(title), strip_control_chars(body));
    }
}

/// Message for an interactive batch that saved `count` articles.
pub fn auto_download_message(count: usize) -> String {
    format!("Auto-downloaded {count} new articles")
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Notifier;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Message {
        Toast(String),
        Notification { title: String, body: String },
    }

    /// Records every message for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        messages: Mutex<Vec<Message>>,
    }

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<Message> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn toast(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(Message::Toast(message.to_string()));
        }

        fn notify(&self, title: &str, body: &str) {
            self.messages.lock().unwrap().push(Message::Notification {
                title: title.to_string(),
                body: body.to_string(),
            });
        }
    }
}
