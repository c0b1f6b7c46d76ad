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

use crate::definitions::RenderMode;

/// Content of one widget view: a line of text and an optional bar level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetView {
    pub text: String,
    pub level: Option<u8>,
    pub visible: bool,
}

/// Shared handle to a view. The widget writes it, the container reads it.
#[derive(Debug, Clone, Default)]
pub struct ViewHandle(Arc<Mutex<WidgetView>>);

impl ViewHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WidgetView {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn edit<R>(&self, f: impl FnOnce(&mut WidgetView) -> R) -> R {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn same_as(&self, other: &ViewHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub widget_id: String,
    pub view: WidgetView,
}

/// Everything the render target needs to draw one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HudFrame {
    pub tick: u64,
    pub mode: RenderMode,
    pub visible: bool,
    pub views: Vec<ViewSnapshot>,
}

/// Receives composed frames on every clock tick.
pub trait FrameSink: Send + Sync {
    fn present(&self, frame: &HudFrame);
}

/// Ordered set of views shown together (mono or stereo).
#[derive(Debug, Default)]
pub struct ViewContainer {
    views: Vec<(String, ViewHandle)>,
    visible: bool,
}

impl ViewContainer {
    pub fn add(&mut self, widget_id: &str, view: ViewHandle) {
        self.views.push((widget_id.to_string(), view));
    }

    pub fn clear(&mut self) {
        self.views.clear();
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn snapshot(&self) -> Vec<ViewSnapshot> {
        self.views
            .iter()
            .map(|(id, view)| ViewSnapshot { widget_id: id.clone(), view: view.snapshot() })
            .collect()
    }
}
