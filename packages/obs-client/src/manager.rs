//! Typed facades over raw OBS requests.
//!
//! Managers are cheap handles naming one OBS object (a scene, an input, a
//! filter). Each method is a single request; nothing is cached except the
//! scene item id, which OBS requires for every scene item call.
//!
//! Protocol reference:
//! <https://github.com/obsproject/obs-websocket/blob/master/docs/generated/protocol.md>

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ObsError, Result};
use crate::Requester;

/// Entry point for all managers. Cheap to clone.
#[derive(Clone)]
pub struct ObsManager {
    requester: Arc<dyn Requester>,
}

impl ObsManager {
    pub fn new(requester: Arc<dyn Requester>) -> Self {
        Self { requester }
    }

    /// The underlying request transport, for requests no manager covers.
    pub fn requester(&self) -> &Arc<dyn Requester> {
        &self.requester
    }

    pub fn media(&self, media: impl Into<String>) -> MediaManager {
        MediaManager {
            requester: self.requester.clone(),
            media: media.into(),
        }
    }

    pub fn hotkey(&self) -> HotkeyManager {
        HotkeyManager {
            requester: self.requester.clone(),
        }
    }

    pub fn filter(&self, source: impl Into<String>, filter: impl Into<String>) -> FilterManager {
        FilterManager {
            requester: self.requester.clone(),
            source: source.into(),
            filter: filter.into(),
        }
    }

    pub fn label(&self, label: impl Into<String>) -> LabelManager {
        LabelManager {
            requester: self.requester.clone(),
            label: label.into(),
        }
    }

    pub fn scene(&self, scene: impl Into<String>) -> SceneManager {
        SceneManager {
            requester: self.requester.clone(),
            scene: scene.into(),
        }
    }

    /// Resolve a scene item. Issues a `GetSceneItemId` request.
    pub async fn scene_item(
        &self,
        scene: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<SceneItemManager> {
        SceneItemManager::resolve(self.requester.clone(), scene.into(), source.into()).await
    }

    pub fn source(&self, source: impl Into<String>) -> SourceManager {
        SourceManager {
            requester: self.requester.clone(),
            source: source.into(),
        }
    }

    /// Names of every scene, in OBS order.
    pub async fn scene_names(&self) -> Result<Vec<String>> {
        let data = self.requester.send("GetSceneList", None).await?;
        let scenes: Vec<Value> = field(&data, "scenes", "GetSceneList")?;
        scenes
            .iter()
            .map(|scene| field::<String>(scene, "sceneName", "GetSceneList"))
            .collect()
    }

    /// Media (`ffmpeg_source`) inputs across all scenes, sorted and deduplicated.
    pub async fn media_sources(&self) -> Result<Vec<String>> {
        let mut sources = BTreeSet::new();
        for scene in self.scene_names().await? {
            let data = self
                .requester
                .send("GetSceneItemList", Some(json!({ "sceneName": scene })))
                .await?;
            let items: Vec<Value> = field(&data, "sceneItems", "GetSceneItemList")?;
            for item in items {
                if item.get("inputKind").and_then(Value::as_str) == Some("ffmpeg_source") {
                    sources.insert(field::<String>(&item, "sourceName", "GetSceneItemList")?);
                }
            }
        }
        Ok(sources.into_iter().collect())
    }
}

impl std::fmt::Debug for ObsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsManager").finish_non_exhaustive()
    }
}

/// Media input playback actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    Play,
    Pause,
    Stop,
    Restart,
    Next,
    Previous,
}

impl MediaAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaAction::Play => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PLAY",
            MediaAction::Pause => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PAUSE",
            MediaAction::Stop => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_STOP",
            MediaAction::Restart => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART",
            MediaAction::Next => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_NEXT",
            MediaAction::Previous => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PREVIOUS",
        }
    }
}

#[derive(Clone)]
pub struct MediaManager {
    requester: Arc<dyn Requester>,
    media: String,
}

impl MediaManager {
    pub fn name(&self) -> &str {
        &self.media
    }

    pub async fn trigger(&self, action: MediaAction) -> Result<()> {
        info!(media = %self.media, ?action, "triggering media action");
        self.requester
            .send(
                "TriggerMediaInputAction",
                Some(json!({ "inputName": self.media, "mediaAction": action.as_str() })),
            )
            .await
            .map(drop)
    }

    pub async fn play(&self) -> Result<()> {
        self.trigger(MediaAction::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.trigger(MediaAction::Pause).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.trigger(MediaAction::Stop).await
    }

    pub async fn restart(&self) -> Result<()> {
        self.trigger(MediaAction::Restart).await
    }
}

/// Modifier keys for [`HotkeyManager::trigger_by_keys`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyModifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
    pub command: bool,
}

#[derive(Clone)]
pub struct HotkeyManager {
    requester: Arc<dyn Requester>,
}

impl HotkeyManager {
    pub async fn trigger_by_name(&self, name: &str) -> Result<()> {
        info!(name, "triggering hotkey");
        self.requester
            .send("TriggerHotkeyByName", Some(json!({ "hotkeyName": name })))
            .await
            .map(drop)
    }

    /// Trigger by key id, e.g. `OBS_KEY_F1`.
    ///
    /// Key ids: <https://github.com/obsproject/obs-studio/blob/master/libobs/obs-hotkeys.h>
    pub async fn trigger_by_keys(&self, key: &str, modifiers: KeyModifiers) -> Result<()> {
        info!(key, ?modifiers, "triggering hotkey sequence");
        self.requester
            .send(
                "TriggerHotkeyByKeySequence",
                Some(json!({
                    "keyId": key,
                    "keyModifiers": {
                        "shift": modifiers.shift,
                        "control": modifiers.control,
                        "alt": modifiers.alt,
                        "command": modifiers.command,
                    }
                })),
            )
            .await
            .map(drop)
    }
}

#[derive(Clone)]
pub struct FilterManager {
    requester: Arc<dyn Requester>,
    source: String,
    filter: String,
}

impl FilterManager {
    async fn get(&self) -> Result<Value> {
        self.requester
            .send(
                "GetSourceFilter",
                Some(json!({ "sourceName": self.source, "filterName": self.filter })),
            )
            .await
    }

    pub async fn enabled(&self) -> Result<bool> {
        field(&self.get().await?, "filterEnabled", "GetSourceFilter")
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        info!(source = %self.source, filter = %self.filter, enabled, "setting filter enabled");
        self.requester
            .send(
                "SetSourceFilterEnabled",
                Some(json!({
                    "sourceName": self.source,
                    "filterName": self.filter,
                    "filterEnabled": enabled,
                })),
            )
            .await
            .map(drop)
    }

    pub async fn settings(&self) -> Result<Value> {
        field(&self.get().await?, "filterSettings", "GetSourceFilter")
    }

    /// Merge `settings` over the current filter settings.
    pub async fn set_settings(&self, settings: Value) -> Result<()> {
        self.requester
            .send(
                "SetSourceFilterSettings",
                Some(json!({
                    "sourceName": self.source,
                    "filterName": self.filter,
                    "filterSettings": settings,
                    "overlay": true,
                })),
            )
            .await
            .map(drop)
    }
}

/// A text input whose `text` setting is used as an overlay label.
#[derive(Clone)]
pub struct LabelManager {
    requester: Arc<dyn Requester>,
    label: String,
}

impl LabelManager {
    pub async fn text(&self) -> Result<String> {
        let data = self
            .requester
            .send("GetInputSettings", Some(json!({ "inputName": self.label })))
            .await?;
        let settings: Value = field(&data, "inputSettings", "GetInputSettings")?;
        field(&settings, "text", "GetInputSettings")
    }

    pub async fn set_text(&self, text: &str) -> Result<()> {
        info!(label = %self.label, text, "setting label text");
        self.requester
            .send(
                "SetInputSettings",
                Some(json!({
                    "inputName": self.label,
                    "inputSettings": { "text": text },
                    "overlay": true,
                })),
            )
            .await
            .map(drop)
    }
}

#[derive(Clone)]
pub struct SceneManager {
    requester: Arc<dyn Requester>,
    scene: String,
}

impl SceneManager {
    pub async fn item(&self, source: impl Into<String>) -> Result<SceneItemManager> {
        SceneItemManager::resolve(self.requester.clone(), self.scene.clone(), source.into()).await
    }

    pub async fn preview(&self) -> Result<()> {
        info!(scene = %self.scene, "setting scene as preview");
        self.requester
            .send(
                "SetCurrentPreviewScene",
                Some(json!({ "sceneName": self.scene })),
            )
            .await
            .map(drop)
    }

    pub async fn program(&self) -> Result<()> {
        info!(scene = %self.scene, "setting scene as program");
        self.requester
            .send(
                "SetCurrentProgramScene",
                Some(json!({ "sceneName": self.scene })),
            )
            .await
            .map(drop)
    }
}

#[derive(Clone)]
pub struct SceneItemManager {
    requester: Arc<dyn Requester>,
    scene: String,
    source: String,
    item_id: i64,
}

impl SceneItemManager {
    async fn resolve(requester: Arc<dyn Requester>, scene: String, source: String) -> Result<Self> {
        let data = requester
            .send(
                "GetSceneItemId",
                Some(json!({ "sceneName": scene, "sourceName": source })),
            )
            .await?;
        let item_id = field(&data, "sceneItemId", "GetSceneItemId")?;
        Ok(Self {
            requester,
            scene,
            source,
            item_id,
        })
    }

    pub fn item_id(&self) -> i64 {
        self.item_id
    }

    pub async fn enabled(&self) -> Result<bool> {
        let data = self
            .requester
            .send(
                "GetSceneItemEnabled",
                Some(json!({ "sceneName": self.scene, "sceneItemId": self.item_id })),
            )
            .await?;
        field(&data, "sceneItemEnabled", "GetSceneItemEnabled")
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        info!(scene = %self.scene, source = %self.source, enabled, "setting scene item enabled");
        self.requester
            .send(
                "SetSceneItemEnabled",
                Some(json!({
                    "sceneName": self.scene,
                    "sceneItemId": self.item_id,
                    "sceneItemEnabled": enabled,
                })),
            )
            .await
            .map(drop)
    }

    pub async fn locked(&self) -> Result<bool> {
        let data = self
            .requester
            .send(
                "GetSceneItemLocked",
                Some(json!({ "sceneName": self.scene, "sceneItemId": self.item_id })),
            )
            .await?;
        field(&data, "sceneItemLocked", "GetSceneItemLocked")
    }

    pub async fn set_locked(&self, locked: bool) -> Result<()> {
        info!(scene = %self.scene, source = %self.source, locked, "setting scene item locked");
        self.requester
            .send(
                "SetSceneItemLocked",
                Some(json!({
                    "sceneName": self.scene,
                    "sceneItemId": self.item_id,
                    "sceneItemLocked": locked,
                })),
            )
            .await
            .map(drop)
    }
}

#[derive(Clone)]
pub struct SourceManager {
    requester: Arc<dyn Requester>,
    source: String,
}

impl SourceManager {
    pub fn filter(&self, filter: impl Into<String>) -> FilterManager {
        FilterManager {
            requester: self.requester.clone(),
            source: self.source.clone(),
            filter: filter.into(),
        }
    }
}

fn field<T: DeserializeOwned>(data: &Value, key: &str, request_type: &str) -> Result<T> {
    let value = data.get(key).cloned().ok_or_else(|| {
        ObsError::Protocol(format!("{} response is missing `{}`", request_type, key))
    })?;
    serde_json::from_value(value).map_err(|e| {
        ObsError::Protocol(format!(
            "{} response has invalid `{}`: {}",
            request_type, key, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers every request with a fixed response per request type.
    #[derive(Default)]
    struct FakeRequester {
        calls: Mutex<Vec<(String, Option<Value>)>>,
        responses: Vec<(&'static str, Value)>,
    }

    #[async_trait]
    impl Requester for FakeRequester {
        async fn send(&self, request_type: &str, request_data: Option<Value>) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((request_type.to_string(), request_data.clone()));
            let response = self
                .responses
                .iter()
                .filter(|(name, _)| *name == request_type)
                .find(|(_, response)| match (&request_data, response.get("_when")) {
                    (Some(data), Some(when)) => data.get("sceneName") == Some(when),
                    _ => true,
                })
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| json!({}));
            Ok(response)
        }
    }

    fn manager(fake: FakeRequester) -> (ObsManager, Arc<FakeRequester>) {
        let fake = Arc::new(fake);
        (ObsManager::new(fake.clone()), fake)
    }

    #[tokio::test]
    async fn test_media_restart_sends_action() {
        let (obs, fake) = manager(FakeRequester::default());

        obs.media("intro").restart().await.unwrap();

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls[0].0, "TriggerMediaInputAction");
        assert_eq!(
            calls[0].1,
            Some(json!({
                "inputName": "intro",
                "mediaAction": "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART"
            }))
        );
    }

    #[tokio::test]
    async fn test_label_text_reads_input_settings() {
        let (obs, _) = manager(FakeRequester {
            responses: vec![(
                "GetInputSettings",
                json!({ "inputSettings": { "text": "Black: Ke Jie" } }),
            )],
            ..Default::default()
        });

        assert_eq!(obs.label("black").text().await.unwrap(), "Black: Ke Jie");
    }

    #[tokio::test]
    async fn test_scene_item_resolves_id_once() {
        let (obs, fake) = manager(FakeRequester {
            responses: vec![
                ("GetSceneItemId", json!({ "sceneItemId": 7 })),
                ("GetSceneItemEnabled", json!({ "sceneItemEnabled": true })),
            ],
            ..Default::default()
        });

        let item = obs.scene("Game").item("Board").await.unwrap();
        assert_eq!(item.item_id(), 7);
        assert!(item.enabled().await.unwrap());
        item.set_enabled(false).await.unwrap();

        let calls = fake.calls.lock().unwrap();
        let names: Vec<&str> = calls.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec!["GetSceneItemId", "GetSceneItemEnabled", "SetSceneItemEnabled"]
        );
        assert_eq!(calls[2].1.as_ref().unwrap()["sceneItemId"], json!(7));
    }

    #[tokio::test]
    async fn test_missing_field_is_protocol_error() {
        let (obs, _) = manager(FakeRequester::default());

        let err = obs.filter("Camera", "Blur").enabled().await.unwrap_err();
        assert!(matches!(err, ObsError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_media_sources_dedups_across_scenes() {
        let (obs, _) = manager(FakeRequester {
            responses: vec![
                (
                    "GetSceneList",
                    json!({ "scenes": [{ "sceneName": "A" }, { "sceneName": "B" }] }),
                ),
                (
                    "GetSceneItemList",
                    json!({ "_when": "A", "sceneItems": [
                        { "sourceName": "outro", "inputKind": "ffmpeg_source" },
                        { "sourceName": "label", "inputKind": "text_ft2_source_v2" }
                    ]}),
                ),
                (
                    "GetSceneItemList",
                    json!({ "_when": "B", "sceneItems": [
                        { "sourceName": "intro", "inputKind": "ffmpeg_source" },
                        { "sourceName": "outro", "inputKind": "ffmpeg_source" }
                    ]}),
                ),
            ],
            ..Default::default()
        });

        assert_eq!(obs.media_sources().await.unwrap(), vec!["intro", "outro"]);
    }
}
