use image::{Rgba, RgbaImage};
use rdev::Key;
use retrace::store::MemoryImageStore;
use retrace::{
    Action, HookEvent, ImageStore, MouseButton, Point, Screen, ScreenError, Screenshot,
    StoreError, Target,
};
use retrace_recorder::{RecorderConfig, RecordingSession, SessionFlow};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Desk;

impl Screen for Desk {
    fn capture(&self) -> Result<Screenshot, ScreenError> {
        Ok(Screenshot::new(
            RgbaImage::from_fn(400, 300, |x, y| Rgba([x as u8, y as u8, 90, 255])),
            Point::new(0, 0),
        ))
    }
}

struct FullDisk;

impl ImageStore for FullDisk {
    fn save_template(&self, _: &RgbaImage, _: f64) -> Result<PathBuf, StoreError> {
        Err(StoreError::NotFound("no space left".into()))
    }
    fn list(&self) -> Result<Vec<PathBuf>, StoreError> {
        Ok(Vec::new())
    }
    fn remove(&self, _: &Path) -> Result<(), StoreError> {
        Ok(())
    }
}

fn session_with(images: Arc<dyn ImageStore>) -> RecordingSession {
    RecordingSession::new(RecorderConfig::default(), Arc::new(Desk), images)
}

fn press(x: i32, y: i32) -> HookEvent {
    HookEvent::ButtonPress {
        button: MouseButton::Left,
        position: Point::new(x, y),
    }
}

fn release(x: i32, y: i32) -> HookEvent {
    HookEvent::ButtonRelease {
        button: MouseButton::Left,
        position: Point::new(x, y),
    }
}

fn moved(x: i32, y: i32) -> HookEvent {
    HookEvent::Move {
        position: Point::new(x, y),
    }
}

#[test]
fn test_short_press_release_becomes_click_with_template() {
    let images = Arc::new(MemoryImageStore::new());
    let mut session = session_with(images.clone());

    session.handle(&press(200, 150), 10.0);
    session.handle(&moved(202, 152), 10.05);
    session.handle(&release(203, 154), 10.1);

    let steps = session.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].action, Action::Click);
    assert_eq!(steps[0].time, Some(10.1));
    assert_eq!(steps[0].button.as_deref(), Some("Button.left"));

    let locator = steps[0].locator.as_ref().unwrap();
    let Target::Image { path, fallback } = locator.target().unwrap() else {
        panic!("expected image locator, got {locator:?}");
    };
    assert_eq!(fallback, Some(Point::new(203, 154)));
    assert_eq!(path, PathBuf::from("memory/click_10100.png"));
    let template = images.get(&path).unwrap();
    assert_eq!(template.dimensions(), (100, 100));
    assert_eq!(template.get_pixel(0, 0), &Rgba([153, 104, 90, 255]));
}

#[test]
fn test_long_press_release_is_a_drag() {
    let mut session = session_with(Arc::new(MemoryImageStore::new()));

    session.handle(&moved(5, 5), 0.5);
    session.handle(&press(10, 10), 1.0);
    session.handle(&moved(30, 30), 1.1);
    session.handle(&release(40, 50), 1.2);
    session.handle(&moved(70, 70), 1.3);

    let actions: Vec<_> = session.steps().iter().map(|s| s.action.clone()).collect();
    assert_eq!(actions, vec![Action::MouseDown, Action::Move, Action::MouseUp]);
    assert_eq!(session.steps()[0].position, Some(Point::new(10, 10)));
    assert_eq!(session.steps()[2].position, Some(Point::new(40, 50)));
}

#[test]
fn test_click_without_template_keeps_coordinates() {
    let mut session = session_with(Arc::new(FullDisk));
    session.handle(&press(20, 30), 1.0);
    session.handle(&release(20, 30), 1.05);

    let json = serde_json::to_value(&session.steps()[0]).unwrap();
    assert_eq!(json["action"], "click");
    assert_eq!(json["locator"], serde_json::json!({"by": "coords", "value": [20, 30]}));
}

#[test]
fn test_scroll_and_keys() {
    let mut session = session_with(Arc::new(MemoryImageStore::new()));
    session.handle(
        &HookEvent::Wheel {
            position: Point::new(7, 8),
            delta_x: 0,
            delta_y: -3,
        },
        1.0,
    );
    session.handle(
        &HookEvent::Wheel {
            position: Point::new(7, 8),
            delta_x: 2,
            delta_y: 0,
        },
        1.1,
    );
    session.handle(
        &HookEvent::KeyPress {
            key: Key::KeyH,
            text: Some("h".into()),
        },
        2.0,
    );
    session.handle(&HookEvent::KeyRelease { key: Key::KeyH }, 2.05);
    session.handle(
        &HookEvent::KeyPress {
            key: Key::Return,
            text: None,
        },
        2.1,
    );

    let steps = session.steps();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].action, Action::Scroll);
    assert_eq!(steps[0].delta, Some(-3));
    assert_eq!(steps[0].position, Some(Point::new(7, 8)));
    assert_eq!(steps[1].key.as_deref(), Some("h"));
    assert_eq!(steps[2].key.as_deref(), Some("Key.enter"));
}

#[test]
fn test_stop_key_is_not_recorded() {
    let mut session = session_with(Arc::new(MemoryImageStore::new()));
    let flow = session.handle(
        &HookEvent::KeyPress {
            key: Key::Escape,
            text: None,
        },
        1.0,
    );
    assert_eq!(flow, SessionFlow::Stop);
    assert!(session.steps().is_empty());
}
