// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

/// Persistent notice telling the user the HUD session is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceNotice {
    pub title: String,
    pub detail: String,
}

/// Host notification surface used for the presence notice.
pub trait PresenceNotifier: Send + Sync {
    /// Shows the notice, replacing the previous one.
    fn show(&self, notice: &PresenceNotice);

    fn dismiss(&self);
}

/// Keeps one presence notice up from session start until shutdown.
pub struct PresenceIndicator {
    notifier: Arc<dyn PresenceNotifier>,
    title: String,
    current: Mutex<Option<PresenceNotice>>,
}

impl PresenceIndicator {
    pub fn new(notifier: Arc<dyn PresenceNotifier>, title: impl Into<String>) -> Self {
        Self { notifier, title: title.into(), current: Mutex::new(None) }
    }

    /// Shows or updates the notice. Unchanged text is not re-posted.
    pub fn show(&self, detail: &str) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|n| n.detail == detail) {
            return;
        }
        let notice = PresenceNotice { title: self.title.clone(), detail: detail.to_string() };
        debug!("Presence notice: {}", notice.detail);
        self.notifier.show(&notice);
        *current = Some(notice);
    }

    pub fn is_shown(&self) -> bool {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub fn current(&self) -> Option<PresenceNotice> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn dismiss(&self) {
        let previous = self.current.lock().unwrap_or_else(PoisonError::into_inner).take();
        if previous.is_some() {
            self.notifier.dismiss();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub shown: Mutex<Vec<PresenceNotice>>,
        pub dismissed: Mutex<usize>,
    }

    impl PresenceNotifier for RecordingNotifier {
        fn show(&self, notice: &PresenceNotice) {
            self.shown.lock().unwrap().push(notice.clone());
        }
        fn dismiss(&self) {
            *self.dismissed.lock().unwrap() += 1;
        }
    }

    #[test]
    fn repeated_text_is_posted_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let presence = PresenceIndicator::new(notifier.clone(), "HUD");
        presence.show("Waiting for glasses");
        presence.show("Waiting for glasses");
        presence.show("Glasses connected");
        assert_eq!(notifier.shown.lock().unwrap().len(), 2);
        presence.dismiss();
        presence.dismiss();
        assert_eq!(*notifier.dismissed.lock().unwrap(), 1);
        assert!(!presence.is_shown());
    }
}
