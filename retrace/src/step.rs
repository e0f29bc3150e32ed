//! Step data model shared by the recorder, the stores and the playback controller.
//!
//! Steps are stored as loose JSON objects: unknown actions, unknown locator strategies
//! and unknown extra fields all survive a load/save round trip. Validation happens at
//! dispatch time, where a bad step fails on its own without affecting the rest of the
//! script.

use crate::errors::LocateError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

/// An integer screen coordinate, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels.
    pub fn distance(&self, other: Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Parses `[x, y]` from a JSON value. Floats are rounded.
    pub fn from_value(value: &Value) -> Option<Point> {
        let pair = value.as_array()?;
        if pair.len() != 2 {
            return None;
        }
        let x = pair[0].as_f64()?;
        let y = pair[1].as_f64()?;
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some(Point::new(x.round() as i32, y.round() as i32))
    }

    pub fn to_value(self) -> Value {
        Value::from(vec![self.x, self.y])
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Point::new(x, y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.x, self.y].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [x, y] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Point::new(x.round() as i32, y.round() as i32))
    }
}

/// The action a step performs.
///
/// Unrecognized names are kept as [`Action::Other`] so that a script written by a newer
/// tool still loads; such steps fail individually at dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Click,
    MouseDown,
    MouseUp,
    Move,
    Scroll,
    Keyboard,
    Assert,
    Drag,
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Click => "click",
            Action::MouseDown => "mouseDown",
            Action::MouseUp => "mouseUp",
            Action::Move => "move",
            Action::Scroll => "scroll",
            Action::Keyboard => "keyboard",
            Action::Assert => "assert",
            Action::Drag => "drag",
            Action::Other(name) => name,
        }
    }

    /// Actions whose target comes from a locator.
    pub fn needs_locator(&self) -> bool {
        matches!(
            self,
            Action::Click | Action::Move | Action::Assert | Action::MouseDown | Action::MouseUp
        )
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        match name.as_str() {
            "click" => Action::Click,
            "mouseDown" => Action::MouseDown,
            "mouseUp" => Action::MouseUp,
            "move" => Action::Move,
            "scroll" => Action::Scroll,
            "keyboard" => Action::Keyboard,
            "assert" => Action::Assert,
            "drag" => Action::Drag,
            _ => Action::Other(name),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locator as it appears in a stored script: `{"by": ..., "value": ..., "fallback": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    pub by: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed form of a [`Locator`], produced at the resolver boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Coords(Point),
    Image {
        path: PathBuf,
        fallback: Option<Point>,
    },
    Text(String),
}

impl Locator {
    pub fn coords(point: Point) -> Self {
        Self {
            by: "coords".to_string(),
            value: point.to_value(),
            fallback: None,
            extra: Map::new(),
        }
    }

    pub fn image(path: impl Into<PathBuf>, fallback: Option<Point>) -> Self {
        Self {
            by: "image".to_string(),
            value: Value::String(path.into().to_string_lossy().into_owned()),
            fallback: fallback.map(Point::to_value),
            extra: Map::new(),
        }
    }

    pub fn text(needle: impl Into<String>) -> Self {
        Self {
            by: "text".to_string(),
            value: Value::String(needle.into()),
            fallback: None,
            extra: Map::new(),
        }
    }

    /// Converts the stored locator into a [`Target`].
    pub fn target(&self) -> Result<Target, LocateError> {
        match self.by.as_str() {
            "coords" => Point::from_value(&self.value).map(Target::Coords).ok_or_else(|| {
                LocateError::InvalidLocator(format!(
                    "coords locator needs [x, y], got {}",
                    self.value
                ))
            }),
            "image" => {
                let path = self
                    .value
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        LocateError::InvalidLocator(format!(
                            "image locator needs a template path, got {}",
                            self.value
                        ))
                    })?;
                let fallback = match &self.fallback {
                    None | Some(Value::Null) => None,
                    Some(raw) => {
                        let parsed = Point::from_value(raw);
                        if parsed.is_none() {
                            warn!("Ignoring malformed fallback {} for {}", raw, path);
                        }
                        parsed
                    }
                };
                Ok(Target::Image {
                    path: PathBuf::from(path),
                    fallback,
                })
            }
            "text" => self
                .value
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| Target::Text(s.to_string()))
                .ok_or_else(|| {
                    LocateError::InvalidLocator(format!(
                        "text locator needs a non-empty string, got {}",
                        self.value
                    ))
                }),
            other => Err(LocateError::UnsupportedLocatorStrategy(other.to_string())),
        }
    }

    /// Template path of an image-strategy locator.
    pub fn image_path(&self) -> Option<&str> {
        if self.by == "image" {
            self.value.as_str()
        } else {
            None
        }
    }
}

/// One recorded or replayable action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<Locator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Set on a step whose stored form did not parse; names the offending field. The
    /// raw fields stay in `extra` and the step fails at dispatch.
    #[serde(skip)]
    pub malformed: Option<String>,
}

impl Step {
    fn bare(action: Action, time: Option<f64>) -> Self {
        Self {
            action,
            locator: None,
            position: None,
            delta: None,
            key: None,
            start_position: None,
            end_position: None,
            x: None,
            y: None,
            button: None,
            time,
            extra: Map::new(),
            malformed: None,
        }
    }

    /// Parses one stored step. A value that does not fit the step shape becomes a
    /// placeholder that keeps its raw fields and fails on its own at dispatch.
    pub fn from_value_lenient(value: Value) -> Self {
        match Step::deserialize(&value) {
            Ok(step) => step,
            Err(e) => {
                let field = malformed_field(&value);
                warn!("Step has a malformed `{}` field: {}", field, e);
                Self::placeholder(value, field)
            }
        }
    }

    fn placeholder(raw: Value, field: String) -> Self {
        let mut fields = match raw {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let action = match fields.remove("action") {
            Some(Value::String(name)) => Action::from(name),
            Some(other) => Action::Other(other.to_string()),
            None => Action::Other(String::new()),
        };
        Self {
            extra: fields,
            malformed: Some(field),
            ..Self::bare(action, None)
        }
    }

    pub fn click(locator: Locator, time: f64) -> Self {
        Self {
            locator: Some(locator),
            ..Self::bare(Action::Click, Some(time))
        }
    }

    pub fn move_to(position: Point, time: f64) -> Self {
        Self {
            position: Some(position),
            ..Self::bare(Action::Move, Some(time))
        }
    }

    pub fn mouse_down(position: Point, time: f64) -> Self {
        Self {
            position: Some(position),
            ..Self::bare(Action::MouseDown, Some(time))
        }
    }

    pub fn mouse_up(position: Point, time: f64) -> Self {
        Self {
            position: Some(position),
            ..Self::bare(Action::MouseUp, Some(time))
        }
    }

    pub fn scroll(position: Point, delta: i64, time: f64) -> Self {
        Self {
            position: Some(position),
            delta: Some(delta),
            ..Self::bare(Action::Scroll, Some(time))
        }
    }

    pub fn keyboard(key: impl Into<String>, time: f64) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::bare(Action::Keyboard, Some(time))
        }
    }

    pub fn assert_exists(locator: Locator) -> Self {
        Self {
            locator: Some(locator),
            ..Self::bare(Action::Assert, None)
        }
    }

    pub fn drag(start: Point, end: Point) -> Self {
        Self {
            start_position: Some(start),
            end_position: Some(end),
            ..Self::bare(Action::Drag, None)
        }
    }

    /// Builder-style timestamp override.
    pub fn at(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    /// Literal coordinates carried by the step: `position`, else legacy `x`/`y`.
    pub fn literal_position(&self) -> Option<Point> {
        if let Some(position) = self.position {
            return Some(position);
        }
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => {
                Some(Point::new(x.round() as i32, y.round() as i32))
            }
            _ => None,
        }
    }

    /// The step's locator, synthesizing a coords locator from raw coordinates for
    /// legacy steps that were saved without one.
    pub fn effective_locator(&self) -> Option<Locator> {
        self.locator
            .clone()
            .or_else(|| self.literal_position().map(Locator::coords))
    }
}

/// First field of `value` that fails to parse on its own. Falls back to `action` for
/// an object missing it and to `step` for a value that is not an object at all.
fn malformed_field(value: &Value) -> String {
    let Some(fields) = value.as_object() else {
        return "step".to_string();
    };
    for (name, field) in fields {
        let mut single = Map::new();
        single.insert("action".to_string(), Value::from("move"));
        single.insert(name.clone(), field.clone());
        if Step::deserialize(&Value::Object(single)).is_err() {
            return name.clone();
        }
    }
    "action".to_string()
}

/// An ordered list of steps.
///
/// Deserialization is lenient: a non-array document is an empty script, and a bad
/// element becomes a placeholder step instead of failing the whole list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Parses a step list element by element. Only a document that is not an array
    /// counts as an empty script.
    pub fn from_value_lenient(value: Value) -> Self {
        match value {
            Value::Array(items) => Self {
                steps: items.into_iter().map(Step::from_value_lenient).collect(),
            },
            other => {
                warn!("Treating non-array script document as empty: {}", kind(&other));
                Self::default()
            }
        }
    }

    /// String form of [`Script::from_value_lenient`].
    pub fn from_json_lenient(json: &str) -> Self {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => Self::from_value_lenient(value),
            Err(e) => {
                warn!("Treating unparseable script as empty: {}", e);
                Self::default()
            }
        }
    }

    /// Every template path referenced by an image-strategy locator.
    pub fn image_references(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter_map(|step| step.locator.as_ref())
            .filter_map(Locator::image_path)
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Script::from_value_lenient)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl From<Vec<Step>> for Script {
    fn from(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_keeps_unknown_fields() {
        let raw = json!({
            "action": "click",
            "locator": {"by": "coords", "value": [10, 20], "note": "kept"},
            "button": "Button.left",
            "time": 12.5,
            "comment": "hand edited"
        });
        let step: Step = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(step.action, Action::Click);
        assert_eq!(step.extra.get("comment"), Some(&json!("hand edited")));

        let back = serde_json::to_value(&step).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_unknown_action_survives_load() {
        let step: Step = serde_json::from_value(json!({"action": "hover"})).unwrap();
        assert_eq!(step.action, Action::Other("hover".into()));
        assert_eq!(serde_json::to_value(&step).unwrap(), json!({"action": "hover"}));
    }

    #[test]
    fn test_locator_targets() {
        assert_eq!(
            Locator::coords(Point::new(100, 200)).target().unwrap(),
            Target::Coords(Point::new(100, 200))
        );

        let image = Locator::image("recorded_images/a.png", Some(Point::new(5, 6)));
        assert_eq!(
            image.target().unwrap(),
            Target::Image {
                path: PathBuf::from("recorded_images/a.png"),
                fallback: Some(Point::new(5, 6)),
            }
        );

        let bad: Locator = serde_json::from_value(json!({"by": "coords", "value": [1]})).unwrap();
        assert!(matches!(bad.target(), Err(LocateError::InvalidLocator(_))));

        let xpath: Locator =
            serde_json::from_value(json!({"by": "xpath", "value": "//button"})).unwrap();
        assert!(matches!(
            xpath.target(),
            Err(LocateError::UnsupportedLocatorStrategy(s)) if s == "xpath"
        ));
    }

    #[test]
    fn test_malformed_fallback_is_dropped() {
        let locator: Locator = serde_json::from_value(
            json!({"by": "image", "value": "t.png", "fallback": [1, 2, 3]}),
        )
        .unwrap();
        assert_eq!(
            locator.target().unwrap(),
            Target::Image {
                path: PathBuf::from("t.png"),
                fallback: None,
            }
        );
    }

    #[test]
    fn test_effective_locator_from_legacy_coordinates() {
        let step: Step =
            serde_json::from_value(json!({"action": "click", "x": 3.6, "y": 4})).unwrap();
        assert_eq!(
            step.effective_locator().unwrap(),
            Locator::coords(Point::new(4, 4))
        );

        let step: Step = serde_json::from_value(json!({"action": "move"})).unwrap();
        assert!(step.effective_locator().is_none());
    }

    #[test]
    fn test_float_positions_are_rounded() {
        let step: Step =
            serde_json::from_value(json!({"action": "scroll", "position": [10.4, 20.6], "delta": -3}))
                .unwrap();
        assert_eq!(step.position, Some(Point::new(10, 21)));
    }

    #[test]
    fn test_non_array_script_is_empty() {
        assert!(Script::from_json_lenient("{not json").is_empty());
        assert!(Script::from_json_lenient(r#"{"action": "click"}"#).is_empty());
        assert_eq!(
            Script::from_json_lenient(r#"[{"action": "keyboard", "key": "a"}]"#).len(),
            1
        );
    }

    #[test]
    fn test_bad_step_becomes_placeholder() {
        let cases = [
            (json!({"action": "scroll", "position": [1, 2], "delta": 1.5}), "delta"),
            (json!({"action": "scroll", "position": [1, 2, 3], "delta": 1}), "position"),
            (json!({"action": "keyboard", "key": 13}), "key"),
            (json!({"action": "click", "locator": {"value": [1, 2]}}), "locator"),
            (json!({"action": 7}), "action"),
            (json!({"key": "a"}), "action"),
            (json!("click"), "step"),
        ];
        for (raw, field) in cases {
            let script = Script::from_value_lenient(json!([
                {"action": "keyboard", "key": "a"},
                raw.clone(),
                {"action": "keyboard", "key": "b"}
            ]));
            assert_eq!(script.len(), 3, "{raw}");
            assert!(script.steps[0].malformed.is_none());
            assert_eq!(script.steps[1].malformed.as_deref(), Some(field), "{raw}");
            assert_eq!(script.steps[2].key.as_deref(), Some("b"));
        }
    }

    #[test]
    fn test_placeholder_keeps_raw_fields() {
        let raw = json!({"action": "keyboard", "key": 13, "time": 4.0});
        let step = Step::from_value_lenient(raw.clone());
        assert_eq!(step.action, Action::Keyboard);
        assert_eq!(serde_json::to_value(&step).unwrap(), raw);

        let stored: Script = serde_json::from_value(json!([raw])).unwrap();
        assert_eq!(stored.steps[0].malformed.as_deref(), Some("key"));
    }

    #[test]
    fn test_distance_spans_full_range() {
        let d = Point::new(i32::MIN, 0).distance(Point::new(i32::MAX, 0));
        assert!((d - u32::MAX as f64).abs() < 1.0, "{d}");
    }
}
