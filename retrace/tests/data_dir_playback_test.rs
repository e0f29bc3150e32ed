use image::{Rgba, RgbaImage};
use retrace::{
    DataDir, EngineConfig, InputDriver, InputError, MouseButton, PlaybackController, Point,
    ReportStore, Screen, ScreenError, ScriptStore, Screenshot, Step,
};
use retrace::step::Locator;
use std::sync::{Arc, Mutex};

struct StillScreen;

impl Screen for StillScreen {
    fn capture(&self) -> Result<Screenshot, ScreenError> {
        Ok(Screenshot::new(
            RgbaImage::from_pixel(40, 30, Rgba([12, 34, 56, 255])),
            Point::new(0, 0),
        ))
    }
}

#[derive(Default)]
struct Clicks(Mutex<Vec<Point>>);

impl InputDriver for Clicks {
    fn move_to(&self, point: Point) -> Result<(), InputError> {
        self.0.lock().unwrap().push(point);
        Ok(())
    }
    fn press(&self, _: MouseButton) -> Result<(), InputError> {
        Ok(())
    }
    fn release(&self, _: MouseButton) -> Result<(), InputError> {
        Ok(())
    }
    fn wheel(&self, _: i64) -> Result<(), InputError> {
        Ok(())
    }
    fn key_down(&self, _: rdev::Key) -> Result<(), InputError> {
        Ok(())
    }
    fn key_up(&self, _: rdev::Key) -> Result<(), InputError> {
        Ok(())
    }
}

#[test]
fn test_saved_script_plays_back_and_reports() {
    let tmp = tempfile::tempdir().unwrap();
    let data = DataDir::new(tmp.path());
    let scripts = data.script_store();

    let id = scripts
        .save(
            &[
                Step::click(Locator::coords(Point::new(10, 20)), 1.0),
                // The template file was never written, so this step fails.
                Step::click(Locator::image(data.images_dir().join("click_1.png"), None), 1.1),
                Step::click(Locator::coords(Point::new(30, 40)), 1.2),
            ],
            "demo",
            &["smoke".to_string()],
        )
        .unwrap();

    let stored = scripts.load_latest().unwrap().unwrap();
    assert_eq!(stored.id, id);

    let driver = Arc::new(Clicks::default());
    let reports: Arc<dyn ReportStore> = Arc::new(data.report_store());
    let playback = PlaybackController::new(
        EngineConfig::without_delays(),
        Arc::new(StillScreen),
        driver.clone(),
    )
    .with_error_dir(data.errors_dir())
    .with_report_store(reports);

    let report = playback.spawn(stored.steps, Some(stored.id)).unwrap().join().unwrap();
    assert_eq!(report.total_steps, 3);
    assert_eq!(report.succeeded_count, 2);
    assert_eq!(*driver.0.lock().unwrap(), vec![Point::new(10, 20), Point::new(30, 40)]);
    assert!(data.errors_dir().join("step_2_error.png").is_file());

    let saved = data.report_store().list().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].report.script_id.as_deref(), Some(id.as_str()));
    let shown = data.report_store().load(&saved[0].id).unwrap();
    assert_eq!(shown.report.log_lines.len(), 3);
}
