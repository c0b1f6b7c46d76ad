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

use crate::definitions::RenderMode;
use crate::hud::frame::ViewHandle;

/// Lifecycle contract shared by every overlay widget.
///
/// Views must exist once `initialize` returns and must stay the same handles across
/// re-initialization. `update` runs on the framework's clock task and only pulls fresh
/// values into the views; anything heavier belongs to a collaborator running elsewhere.
pub trait HudWidget: Send + Sync {
    fn id(&self) -> &str;

    fn initialize(&mut self);

    fn set_render_mode(&mut self, mode: RenderMode);

    fn set_visible(&mut self, visible: bool);

    fn update(&mut self);

    fn cleanup(&mut self);

    fn mono_view(&self) -> Option<ViewHandle>;

    /// Single-eye view used by the stereo container.
    fn stereo_view(&self) -> Option<ViewHandle>;
}

/// Bookkeeping most widgets share: identity, both views and the mirrored
/// mode/visibility.
#[derive(Debug)]
pub struct WidgetCore {
    id: String,
    mono: Option<ViewHandle>,
    stereo: Option<ViewHandle>,
    mode: RenderMode,
    visible: bool,
}

impl WidgetCore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mono: None,
            stereo: None,
            mode: RenderMode::Mono,
            visible: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creates the views on first call, keeps them afterwards.
    pub fn ensure_views(&mut self) {
        let visible = self.visible;
        for slot in [&mut self.mono, &mut self.stereo] {
            if slot.is_none() {
                let view = ViewHandle::new();
                view.edit(|v| v.visible = visible);
                *slot = Some(view);
            }
        }
    }

    pub fn release_views(&mut self) {
        self.mono = None;
        self.stereo = None;
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.each_view(|v| v.visible = visible);
    }

    pub fn set_text(&self, text: &str) {
        self.each_view(|v| {
            if v.text != text {
                v.text = text.to_string();
            }
        });
    }

    pub fn set_level(&self, level: Option<u8>) {
        self.each_view(|v| v.level = level);
    }

    pub fn mono_view(&self) -> Option<ViewHandle> {
        self.mono.clone()
    }

    pub fn stereo_view(&self) -> Option<ViewHandle> {
        self.stereo.clone()
    }

    fn each_view(&self, f: impl Fn(&mut crate::hud::frame::WidgetView)) {
        for view in [&self.mono, &self.stereo].into_iter().flatten() {
            view.edit(&f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_survive_reinitialization() {
        let mut core = WidgetCore::new("w");
        core.ensure_views();
        let mono = core.mono_view().unwrap();
        core.ensure_views();
        assert!(mono.same_as(&core.mono_view().unwrap()));
    }

    #[test]
    fn text_and_visibility_reach_both_views() {
        let mut core = WidgetCore::new("w");
        core.ensure_views();
        core.set_text("12:00");
        core.set_visible(false);
        for view in [core.mono_view().unwrap(), core.stereo_view().unwrap()] {
            let snap = view.snapshot();
            assert_eq!(snap.text, "12:00");
            assert!(!snap.visible);
        }
    }
}
