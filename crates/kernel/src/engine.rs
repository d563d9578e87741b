use tracing::{debug, info, warn};

use crate::backend::{
    GraphicsBackend, HeadlessWindow, NullGraphics, NullSound, SoundBackend, WindowEvent,
    WindowHandle, WindowSystem,
};
use crate::bus::{Handlers, MessageQueue};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::frame::{Control, Frame, SceneRequest};
use crate::scene::{Scene, Services};
use stride_common::CallbackError;

/// The collaborators an engine drives.
pub struct Backends {
    pub graphics: Box<dyn GraphicsBackend>,
    pub sound: Box<dyn SoundBackend>,
    pub window: Box<dyn WindowSystem>,
    pub clock: Box<dyn Clock>,
}

impl Backends {
    /// Null graphics and sound, a headless window and the system clock.
    pub fn headless() -> Self {
        Self {
            graphics: Box::new(NullGraphics::default()),
            sound: Box::new(NullSound),
            window: Box::new(HeadlessWindow::new()),
            clock: Box::new(SystemClock::new()),
        }
    }

    pub fn with_graphics(mut self, graphics: impl GraphicsBackend + 'static) -> Self {
        self.graphics = Box::new(graphics);
        self
    }

    pub fn with_sound(mut self, sound: impl SoundBackend + 'static) -> Self {
        self.sound = Box::new(sound);
        self
    }

    pub fn with_window(mut self, window: impl WindowSystem + 'static) -> Self {
        self.window = Box::new(window);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }
}

/// Running totals since the engine was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Outer loop iterations executed by `run`.
    pub iterations: u64,
    pub updates: u64,
    pub draws: u64,
    /// Draws that fired with the lagging flag set.
    pub lagged_draws: u64,
    /// Messages delivered to at least one handler.
    pub dispatched_messages: u64,
    /// Messages discarded because nothing handled them.
    pub dropped_messages: u64,
}

/// Steps executed by one call to `Engine::advance`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub updates: u32,
    pub draws: u32,
}

/// Fixed-timestep scheduler and owner of the scene stack, message bus and
/// back-ends.
///
/// Simulation advances in constant `update_period` steps regardless of how
/// wall-clock time arrives. Each Update also feeds the draw accumulator, so
/// Draw runs at its own fixed period in simulated time. After every step the
/// message queue is drained and pending scene-stack requests are applied.
pub struct Engine {
    config: EngineConfig,
    update_period: f64,
    draw_period: f64,
    time_since_update: f64,
    time_since_draw: f64,
    scenes: Vec<Scene>,
    queue: MessageQueue,
    handlers: Handlers,
    control: Control,
    graphics: Box<dyn GraphicsBackend>,
    sound: Box<dyn SoundBackend>,
    window: Box<dyn WindowSystem>,
    clock: Box<dyn Clock>,
    window_handle: Option<WindowHandle>,
    graphics_ready: bool,
    sound_ready: bool,
    lagging: bool,
    stats: FrameStats,
}

impl Engine {
    pub fn new(config: EngineConfig, backends: Backends) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            update_period: config.update_period(),
            draw_period: config.draw_period(),
            config,
            time_since_update: 0.0,
            time_since_draw: 0.0,
            scenes: Vec::new(),
            queue: MessageQueue::new(),
            handlers: Handlers::new(),
            control: Control::default(),
            graphics: backends.graphics,
            sound: backends.sound,
            window: backends.window,
            clock: backends.clock,
            window_handle: None,
            graphics_ready: false,
            sound_ready: false,
            lagging: false,
            stats: FrameStats::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Whether the most recent Draw fired while the simulation was behind.
    pub fn is_lagging(&self) -> bool {
        self.lagging
    }

    /// The window opened by `run`, while it is running.
    pub fn window(&self) -> Option<&WindowHandle> {
        self.window_handle.as_ref()
    }

    pub fn current_scene(&self) -> Option<&Scene> {
        self.scenes.last()
    }

    pub fn current_scene_mut(&mut self) -> Option<&mut Scene> {
        self.scenes.last_mut()
    }

    /// Number of scenes on the stack.
    pub fn scene_depth(&self) -> usize {
        self.scenes.len()
    }

    /// Ask the main loop to stop at the top of its next iteration.
    pub fn exit(&mut self) {
        self.control.exit();
    }

    /// True once exit was requested or every scene has been left.
    pub fn is_done(&self) -> bool {
        self.control.exit_requested() || self.scenes.is_empty()
    }

    /// Register a handler for messages of concrete type `M`.
    pub fn on_message<M: 'static>(
        &mut self,
        handler: impl FnMut(&M, &mut Frame<'_>) -> Result<(), CallbackError> + 'static,
    ) {
        self.handlers.on(handler);
    }

    /// Enqueue a message; it is dispatched at the next drain point.
    pub fn post_message<M: 'static>(&mut self, message: M) {
        self.queue.post(message);
    }

    pub fn pending_messages(&self) -> usize {
        self.queue.len()
    }

    /// Push `scene` on top of the stack, making the previous scene its
    /// parent, and run its Init chain.
    pub fn enter_scene(&mut self, scene: Scene) -> Result<(), EngineError> {
        info!(
            scene = scene.name(),
            parent = self.scenes.last().map(Scene::name),
            "entering scene"
        );
        let index = self.scenes.len();
        self.scenes.push(scene);
        self.scenes[index].init(Services {
            messages: &mut self.queue,
            graphics: &mut *self.graphics,
            control: &mut self.control,
        })
    }

    /// Run the current scene's Cleanup chain and return to its parent.
    /// No-op without a current scene.
    pub fn leave_scene(&mut self) -> Result<(), EngineError> {
        let Some(mut scene) = self.scenes.pop() else {
            return Ok(());
        };
        info!(
            scene = scene.name(),
            parent = self.scenes.last().map(Scene::name),
            "leaving scene"
        );
        scene.cleanup(Services {
            messages: &mut self.queue,
            graphics: &mut *self.graphics,
            control: &mut self.control,
        })
    }

    /// Deliver every queued message to the current scene's handlers, including
    /// messages handlers post while the drain is in progress.
    pub fn drain_messages(&mut self) -> Result<(), EngineError> {
        while let Some(message) = self.queue.pop() {
            let Some(scene) = self.scenes.last_mut() else {
                let dropped = 1 + self.queue.clear();
                debug!(dropped, "no current scene, discarding queued messages");
                self.stats.dropped_messages += dropped as u64;
                break;
            };
            let mut frame = Frame {
                entities: scene.entities_mut(),
                messages: &mut self.queue,
                graphics: &mut *self.graphics,
                control: &mut self.control,
            };
            match self.handlers.dispatch(&message, &mut frame) {
                Ok(0) => {
                    debug!(message = message.type_name(), "no handler registered, message dropped");
                    self.stats.dropped_messages += 1;
                }
                Ok(_) => self.stats.dispatched_messages += 1,
                Err(err) => {
                    // It reached a handler before failing.
                    self.stats.dispatched_messages += 1;
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Feed `dt` seconds of wall-clock time to the accumulators and run every
    /// Update and Draw step that becomes due, draining messages after each.
    pub fn advance(&mut self, dt: f64) -> Result<StepReport, EngineError> {
        let dt = match self.config.max_frame_delta {
            Some(max) if dt > max => {
                warn!(dt, max, dropped = dt - max, "frame delta clamped, simulation time lost");
                max
            }
            _ if dt.is_infinite() && dt > 0.0 => {
                warn!("unbounded frame delta ignored");
                0.0
            }
            // Also maps NaN to zero.
            _ => dt.max(0.0),
        };
        // Requests left by a direct `enter_scene` apply before any step runs.
        self.apply_scene_requests()?;
        self.time_since_update += dt;

        let mut report = StepReport::default();
        while !self.scenes.is_empty() {
            let mut stepped = false;

            if self.time_since_update >= self.update_period {
                self.update_step()?;
                report.updates += 1;
                stepped = true;
            }

            if !self.scenes.is_empty() && self.time_since_draw >= self.draw_period {
                self.draw_step()?;
                report.draws += 1;
                stepped = true;
            }

            if !stepped {
                break;
            }
        }
        Ok(report)
    }

    fn update_step(&mut self) -> Result<(), EngineError> {
        let period = self.update_period;
        if let Some(scene) = self.scenes.last_mut() {
            scene.update(
                Services {
                    messages: &mut self.queue,
                    graphics: &mut *self.graphics,
                    control: &mut self.control,
                },
                period,
            )?;
        }
        self.time_since_update -= period;
        self.time_since_draw += period;
        self.stats.updates += 1;
        self.finish_step()
    }

    fn draw_step(&mut self) -> Result<(), EngineError> {
        let period = self.draw_period;
        self.lagging = self.time_since_update > period;
        self.graphics.set_lagging(self.lagging);
        if self.lagging {
            self.stats.lagged_draws += 1;
            debug!(behind = self.time_since_update, "drawing while lagging");
        }

        self.graphics.begin_frame();
        let drawn = match self.scenes.last_mut() {
            Some(scene) => scene.draw(
                Services {
                    messages: &mut self.queue,
                    graphics: &mut *self.graphics,
                    control: &mut self.control,
                },
                period,
            ),
            None => Ok(()),
        };
        self.graphics.end_frame();
        drawn?;

        self.time_since_draw -= period;
        self.stats.draws += 1;
        self.finish_step()
    }

    fn finish_step(&mut self) -> Result<(), EngineError> {
        self.drain_messages()?;
        self.apply_scene_requests()
    }

    fn apply_scene_requests(&mut self) -> Result<(), EngineError> {
        loop {
            let requests = self.control.take_requests();
            if requests.is_empty() {
                return Ok(());
            }
            for request in requests {
                match request {
                    SceneRequest::Enter(scene) => self.enter_scene(scene)?,
                    SceneRequest::Leave => self.leave_scene()?,
                }
            }
        }
    }

    /// Open the window, initialise the back-ends, enter `initial_scene` and
    /// loop until exit is requested or every scene has been left. Returns
    /// after full teardown. The first error wins; teardown still runs after a
    /// failed frame.
    pub fn run(
        &mut self,
        title: &str,
        width: u32,
        height: u32,
        initial_scene: Scene,
    ) -> Result<(), EngineError> {
        let span = tracing::info_span!("engine_run", title);
        let _guard = span.enter();
        info!(
            width,
            height,
            update_hz = self.config.update_hz,
            draw_hz = self.config.draw_hz,
            "starting engine"
        );

        let handle = self.window.open(title, width, height)?;
        self.window_handle = Some(handle.clone());

        let result = self
            .init_backends(&handle)
            .and_then(|()| self.main_loop(initial_scene));
        if let Err(err) = &result {
            warn!(error = %err, "main loop aborted");
        }
        let teardown = self.teardown();

        let stats = self.stats;
        info!(
            iterations = stats.iterations,
            updates = stats.updates,
            draws = stats.draws,
            lagged_draws = stats.lagged_draws,
            "engine stopped"
        );
        result.and(teardown)
    }

    fn init_backends(&mut self, handle: &WindowHandle) -> Result<(), EngineError> {
        self.graphics.init(handle)?;
        self.graphics_ready = true;
        self.sound.init()?;
        self.sound_ready = true;
        Ok(())
    }

    fn main_loop(&mut self, initial_scene: Scene) -> Result<(), EngineError> {
        self.enter_scene(initial_scene)?;
        self.apply_scene_requests()?;
        self.clock.reset();

        while !self.is_done() {
            self.stats.iterations += 1;
            for event in self.window.pump_events()? {
                match event {
                    WindowEvent::CloseRequested => {
                        info!("window close requested");
                        self.exit();
                    }
                    WindowEvent::Resized { width, height } => {
                        debug!(width, height, "window resized");
                    }
                }
            }
            let dt = self.clock.delta();
            self.advance(dt)?;
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), EngineError> {
        let mut first_error: Option<EngineError> = None;
        let mut record = |result: Result<(), EngineError>| {
            if let Err(err) = result {
                warn!(error = %err, "teardown step failed");
                first_error.get_or_insert(err);
            }
        };

        while !self.scenes.is_empty() {
            record(self.leave_scene());
        }
        self.control.take_requests();
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(dropped, "discarding undelivered messages at shutdown");
            self.stats.dropped_messages += dropped as u64;
        }

        // Only what `init_backends` brought up is cleaned up.
        if std::mem::take(&mut self.graphics_ready) {
            record(self.graphics.cleanup().map_err(EngineError::from));
        }
        if std::mem::take(&mut self.sound_ready) {
            record(self.sound.cleanup().map_err(EngineError::from));
        }
        record(self.window.close().map_err(EngineError::from));
        self.window_handle = None;

        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, ManualClock};
    use crate::error::BackendError;
    use crate::subsystem::Subsystem;
    use glam::Mat4;
    use std::cell::RefCell;
    use std::rc::Rc;
    use stride_common::Color;
    use stride_ecs::MeshHandle;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Init(&'static str),
        Update(&'static str, f64),
        Draw(&'static str, f64, bool),
        Cleanup(&'static str),
    }

    type Log = Rc<RefCell<Vec<Call>>>;

    struct Tracer {
        label: &'static str,
        log: Log,
    }

    impl Subsystem for Tracer {
        fn init(&mut self, _frame: &mut Frame<'_>) -> Result<(), EngineError> {
            self.log.borrow_mut().push(Call::Init(self.label));
            Ok(())
        }

        fn update(&mut self, _frame: &mut Frame<'_>, dt: f64) -> Result<(), EngineError> {
            self.log.borrow_mut().push(Call::Update(self.label, dt));
            Ok(())
        }

        fn draw(&mut self, frame: &mut Frame<'_>, dt: f64) -> Result<(), EngineError> {
            let lagging = frame.graphics.is_lagging();
            self.log.borrow_mut().push(Call::Draw(self.label, dt, lagging));
            Ok(())
        }

        fn cleanup(&mut self, _frame: &mut Frame<'_>) -> Result<(), EngineError> {
            self.log.borrow_mut().push(Call::Cleanup(self.label));
            Ok(())
        }
    }

    fn tracer(label: &'static str, log: &Log) -> Tracer {
        Tracer {
            label,
            log: Rc::clone(log),
        }
    }

    fn traced_scene(label: &'static str, log: &Log) -> Scene {
        Scene::new(label).with_subsystem(tracer(label, log))
    }

    /// Update every 1/4 s, draw every 1/2 s, no catch-up cap.
    fn quarter_engine(backends: Backends) -> Engine {
        let config = EngineConfig::with_rates(4.0, 2.0).with_max_frame_delta(None);
        Engine::new(config, backends).unwrap()
    }

    fn update_dts(log: &Log) -> Vec<f64> {
        log.borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Update(_, dt) => Some(*dt),
                _ => None,
            })
            .collect()
    }

    fn draws(log: &Log) -> Vec<(f64, bool)> {
        log.borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Draw(_, dt, lagging) => Some((*dt, *lagging)),
                _ => None,
            })
            .collect()
    }

    struct ExitAfter {
        updates: u32,
        limit: u32,
    }

    impl Subsystem for ExitAfter {
        fn update(&mut self, frame: &mut Frame<'_>, _dt: f64) -> Result<(), EngineError> {
            self.updates += 1;
            if self.updates == self.limit {
                frame.exit();
            }
            Ok(())
        }
    }

    struct EnterChild {
        child: Option<Scene>,
    }

    impl Subsystem for EnterChild {
        fn init(&mut self, frame: &mut Frame<'_>) -> Result<(), EngineError> {
            if let Some(child) = self.child.take() {
                frame.enter_scene(child);
            }
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct Lifecycle {
        inits: u32,
        cleanups: u32,
    }

    struct TrackedGraphics {
        fail_init: bool,
        life: Rc<RefCell<Lifecycle>>,
        inner: NullGraphics,
    }

    impl GraphicsBackend for TrackedGraphics {
        fn init(&mut self, _window: &WindowHandle) -> Result<(), BackendError> {
            if self.fail_init {
                return Err(BackendError::Graphics("no adapter".into()));
            }
            self.life.borrow_mut().inits += 1;
            Ok(())
        }

        fn cleanup(&mut self) -> Result<(), BackendError> {
            self.life.borrow_mut().cleanups += 1;
            Ok(())
        }

        fn begin_frame(&mut self) {}

        fn end_frame(&mut self) {}

        fn clear(&mut self, color: Color) {
            self.inner.clear(color);
        }

        fn draw_tri_mesh(&mut self, mesh: MeshHandle, transform: &Mat4) {
            self.inner.draw_tri_mesh(mesh, transform);
        }

        fn set_lagging(&mut self, lagging: bool) {
            self.inner.set_lagging(lagging);
        }

        fn is_lagging(&self) -> bool {
            self.inner.is_lagging()
        }
    }

    struct TrackedSound {
        fail_init: bool,
        life: Rc<RefCell<Lifecycle>>,
    }

    impl SoundBackend for TrackedSound {
        fn init(&mut self) -> Result<(), BackendError> {
            if self.fail_init {
                return Err(BackendError::Sound("no device".into()));
            }
            self.life.borrow_mut().inits += 1;
            Ok(())
        }

        fn cleanup(&mut self) -> Result<(), BackendError> {
            self.life.borrow_mut().cleanups += 1;
            Ok(())
        }
    }

    fn tracked_backends(
        graphics_fails: bool,
        sound_fails: bool,
    ) -> (Backends, Rc<RefCell<Lifecycle>>, Rc<RefCell<Lifecycle>>) {
        let graphics = Rc::new(RefCell::new(Lifecycle::default()));
        let sound = Rc::new(RefCell::new(Lifecycle::default()));
        let backends = Backends::headless()
            .with_graphics(TrackedGraphics {
                fail_init: graphics_fails,
                life: Rc::clone(&graphics),
                inner: NullGraphics::default(),
            })
            .with_sound(TrackedSound {
                fail_init: sound_fails,
                life: Rc::clone(&sound),
            })
            .with_clock(FixedClock::new(0.25));
        (backends, graphics, sound)
    }

    #[derive(Debug)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Pong;

    #[test]
    fn update_count_follows_elapsed_time() {
        let log = Log::default();
        let mut engine = quarter_engine(Backends::headless());
        engine.enter_scene(traced_scene("main", &log)).unwrap();

        let deltas = [0.125, 0.375, 0.0625, 0.5625, 0.125];
        let mut updates = 0;
        for dt in deltas {
            updates += engine.advance(dt).unwrap().updates;
        }

        let total: f64 = deltas.iter().sum();
        assert_eq!(f64::from(updates), (total / 0.25).floor());
        assert_eq!(update_dts(&log), vec![0.25; 5]);
        assert_eq!(engine.stats().updates, 5);
    }

    #[test]
    fn draws_use_fixed_period() {
        let log = Log::default();
        let mut engine = quarter_engine(Backends::headless());
        engine.enter_scene(traced_scene("main", &log)).unwrap();

        for dt in [0.125, 0.375, 0.0625, 0.5625, 0.125] {
            engine.advance(dt).unwrap();
        }
        let draws = draws(&log);
        assert_eq!(draws.len(), 2);
        assert!(draws.iter().all(|(dt, _)| *dt == 0.5));
    }

    #[test]
    fn lagging_flag_tracks_update_backlog() {
        let log = Log::default();
        let mut engine = quarter_engine(Backends::headless());
        engine.enter_scene(traced_scene("main", &log)).unwrap();

        let report = engine.advance(1.5).unwrap();
        assert_eq!(report, StepReport { updates: 6, draws: 3 });
        // The first draw fires with 1.0 s of updates still pending.
        assert_eq!(draws(&log), vec![(0.5, true), (0.5, false), (0.5, false)]);
        assert_eq!(engine.stats().lagged_draws, 1);
        assert!(!engine.is_lagging());
    }

    #[test]
    fn chain_runs_in_order_and_updates_precede_draw() {
        let log = Log::default();
        let mut engine = quarter_engine(Backends::headless());
        let scene = Scene::new("main")
            .with_subsystem(tracer("a", &log))
            .with_subsystem(tracer("b", &log));
        engine.enter_scene(scene).unwrap();
        engine.advance(0.5).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                Call::Init("a"),
                Call::Init("b"),
                Call::Update("a", 0.25),
                Call::Update("b", 0.25),
                Call::Update("a", 0.25),
                Call::Update("b", 0.25),
                Call::Draw("a", 0.5, false),
                Call::Draw("b", 0.5, false),
            ]
        );
    }

    #[test]
    fn scene_stack_enter_enter_leave() {
        let log = Log::default();
        let mut engine = quarter_engine(Backends::headless());
        engine.enter_scene(traced_scene("a", &log)).unwrap();
        engine.enter_scene(traced_scene("b", &log)).unwrap();
        engine.leave_scene().unwrap();

        assert_eq!(
            *log.borrow(),
            vec![Call::Init("a"), Call::Init("b"), Call::Cleanup("b")]
        );
        assert_eq!(engine.current_scene().unwrap().name(), "a");
        assert_eq!(engine.scene_depth(), 1);
    }

    #[test]
    fn leave_without_scene_is_noop() {
        let mut engine = quarter_engine(Backends::headless());
        engine.leave_scene().unwrap();
        assert!(engine.current_scene().is_none());
        assert!(engine.is_done());
    }

    #[test]
    fn messages_fan_out_to_every_handler() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut engine = quarter_engine(Backends::headless());
        for handler in 0..2 {
            let hits = Rc::clone(&hits);
            engine.on_message(move |ping: &Ping, _frame| {
                hits.borrow_mut().push((ping.0, handler));
                Ok(())
            });
        }
        engine.enter_scene(Scene::new("main")).unwrap();

        for i in 0..3 {
            engine.post_message(Ping(i));
        }
        assert!(hits.borrow().is_empty(), "posting never dispatches inline");
        engine.drain_messages().unwrap();

        assert_eq!(
            *hits.borrow(),
            vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1)]
        );
        assert_eq!(engine.stats().dispatched_messages, 3);
        assert_eq!(engine.pending_messages(), 0);
    }

    #[test]
    fn unhandled_messages_are_dropped_silently() {
        let mut engine = quarter_engine(Backends::headless());
        engine.enter_scene(Scene::new("main")).unwrap();
        engine.post_message(Pong);
        engine.drain_messages().unwrap();
        assert_eq!(engine.stats().dropped_messages, 1);
        assert_eq!(engine.stats().dispatched_messages, 0);
    }

    #[test]
    fn messages_without_scene_are_discarded() {
        let mut engine = quarter_engine(Backends::headless());
        engine.post_message(Ping(1));
        engine.post_message(Ping(2));
        engine.drain_messages().unwrap();
        assert_eq!(engine.stats().dropped_messages, 2);
        assert_eq!(engine.pending_messages(), 0);
    }

    #[test]
    fn messages_posted_in_update_arrive_at_drain_point() {
        struct Poster {
            delivered: Rc<RefCell<u32>>,
            seen: Rc<RefCell<Vec<u32>>>,
        }

        impl Subsystem for Poster {
            fn update(&mut self, frame: &mut Frame<'_>, _dt: f64) -> Result<(), EngineError> {
                self.seen.borrow_mut().push(*self.delivered.borrow());
                frame.post(Ping(0));
                Ok(())
            }
        }

        let delivered = Rc::new(RefCell::new(0));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut engine = quarter_engine(Backends::headless());
        let counter = Rc::clone(&delivered);
        engine.on_message(move |_: &Ping, _frame| {
            *counter.borrow_mut() += 1;
            Ok(())
        });
        engine
            .enter_scene(Scene::new("main").with_subsystem(Poster {
                delivered: Rc::clone(&delivered),
                seen: Rc::clone(&seen),
            }))
            .unwrap();

        engine.advance(0.5).unwrap();
        assert_eq!(*seen.borrow(), vec![0, 1]);
        assert_eq!(*delivered.borrow(), 2);
    }

    #[test]
    fn handler_posts_are_drained_in_same_pass() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut engine = quarter_engine(Backends::headless());
        let log = Rc::clone(&hits);
        engine.on_message(move |ping: &Ping, frame| {
            log.borrow_mut().push(ping.0);
            if ping.0 < 3 {
                frame.post(Ping(ping.0 + 1));
            }
            Ok(())
        });
        engine.enter_scene(Scene::new("main")).unwrap();
        engine.post_message(Ping(0));
        engine.drain_messages().unwrap();
        assert_eq!(*hits.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn handler_error_propagates_from_drain() {
        let mut engine = quarter_engine(Backends::headless());
        engine.on_message(|_: &Ping, _frame| Err("handler exploded".into()));
        engine.enter_scene(Scene::new("main")).unwrap();
        engine.post_message(Ping(0));
        engine.post_message(Ping(1));

        let err = engine.drain_messages().unwrap_err();
        assert_eq!(err.to_string(), "handler exploded");
        assert_eq!(engine.pending_messages(), 1);
        // The failed message was consumed and still counts.
        assert_eq!(engine.stats().dispatched_messages, 1);
        assert_eq!(engine.stats().dropped_messages, 0);
    }

    #[test]
    fn frame_delta_is_capped() {
        let config = EngineConfig::with_rates(4.0, 2.0).with_max_frame_delta(Some(0.5));
        let mut engine = Engine::new(config, Backends::headless()).unwrap();
        engine.enter_scene(Scene::new("main")).unwrap();
        let report = engine.advance(10.0).unwrap();
        assert_eq!(report.updates, 2);
        let report = engine.advance(f64::INFINITY).unwrap();
        assert_eq!(report.updates, 2);
    }

    #[test]
    fn default_hooks_are_noops() {
        struct Idle;
        impl Subsystem for Idle {}

        let mut engine = quarter_engine(Backends::headless());
        engine.enter_scene(Scene::new("main").with_subsystem(Idle)).unwrap();
        engine.advance(1.0).unwrap();
        engine.leave_scene().unwrap();
        assert!(Idle.name().ends_with("Idle"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig::with_rates(0.0, 60.0);
        assert!(matches!(
            Engine::new(config, Backends::headless()),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn run_stops_after_exit_and_tears_down() {
        let log = Log::default();
        let backends = Backends::headless().with_clock(ManualClock::new([0.25; 10]));
        let mut engine = quarter_engine(backends);
        let scene = traced_scene("main", &log).with_subsystem(ExitAfter { updates: 0, limit: 3 });

        engine.run("test", 320, 240, scene).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.updates, 3);
        assert_eq!(log.borrow().last(), Some(&Call::Cleanup("main")));
        assert_eq!(engine.scene_depth(), 0);
        assert!(engine.window().is_none());
    }

    #[test]
    fn window_close_requests_exit() {
        let backends = Backends::headless()
            .with_window(HeadlessWindow::new().close_after(2))
            .with_clock(FixedClock::new(0.25));
        let mut engine = quarter_engine(backends);
        engine.run("test", 1, 1, Scene::new("main")).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.iterations, 2);
        assert_eq!(stats.updates, 2);
    }

    #[test]
    fn callback_error_unwinds_run_after_teardown() {
        struct Failing;
        impl Subsystem for Failing {
            fn update(&mut self, _frame: &mut Frame<'_>, _dt: f64) -> Result<(), EngineError> {
                Err(CallbackError::from("boom").into())
            }
        }

        let log = Log::default();
        let backends = Backends::headless().with_clock(FixedClock::new(0.25));
        let mut engine = quarter_engine(backends);
        let scene = traced_scene("main", &log).with_subsystem(Failing);

        let err = engine.run("test", 1, 1, scene).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(log.borrow().last(), Some(&Call::Cleanup("main")));
        assert_eq!(engine.scene_depth(), 0);
    }

    #[test]
    fn leaving_last_scene_ends_run() {
        struct LeaveOnUpdate;
        impl Subsystem for LeaveOnUpdate {
            fn update(&mut self, frame: &mut Frame<'_>, _dt: f64) -> Result<(), EngineError> {
                frame.leave_scene();
                Ok(())
            }
        }

        let backends = Backends::headless().with_clock(ManualClock::new([1.0]));
        let mut engine = quarter_engine(backends);
        engine
            .run("test", 1, 1, Scene::new("main").with_subsystem(LeaveOnUpdate))
            .unwrap();
        // Four updates were due, but the scene left after the first.
        assert_eq!(engine.stats().updates, 1);
    }

    #[test]
    fn scenes_entered_from_init_are_unwound_in_reverse() {
        let log = Log::default();
        let backends = Backends::headless()
            .with_window(HeadlessWindow::new().close_after(1))
            .with_clock(FixedClock::new(0.25));
        let mut engine = quarter_engine(backends);
        let parent = traced_scene("a", &log).with_subsystem(EnterChild {
            child: Some(traced_scene("b", &log)),
        });
        engine.run("test", 1, 1, parent).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                Call::Init("a"),
                Call::Init("b"),
                Call::Update("b", 0.25),
                Call::Cleanup("b"),
                Call::Cleanup("a"),
            ]
        );
    }

    #[test]
    fn update_count_holds_across_delta_sequences() {
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut generated = Vec::new();
        for _ in 0..40 {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            generated.push((seed >> 40) as f64 / (1u64 << 24) as f64 * 0.8);
        }
        let sequences = vec![
            vec![0.0625; 16],
            vec![0.25, 0.5, 0.75, 1.0],
            vec![0.125, 10.0, 0.0625],
            vec![0.1; 25],
            vec![1.0 / 60.0; 120],
            generated,
        ];

        for deltas in sequences {
            let log = Log::default();
            let mut engine = quarter_engine(Backends::headless());
            engine.enter_scene(traced_scene("main", &log)).unwrap();

            let mut updates = 0u32;
            for &dt in &deltas {
                updates += engine.advance(dt).unwrap().updates;
            }

            let expected = (deltas.iter().sum::<f64>() / 0.25).floor();
            assert!(
                (f64::from(updates) - expected).abs() <= 1.0,
                "{updates} updates for {expected} periods in {deltas:?}"
            );
            let dts = update_dts(&log);
            assert_eq!(dts.len(), updates as usize);
            assert!(dts.iter().all(|&dt| dt == 0.25));
        }
    }

    #[test]
    fn non_finite_delta_is_ignored_without_cap() {
        let mut engine = quarter_engine(Backends::headless());
        engine.enter_scene(Scene::new("main")).unwrap();

        assert_eq!(engine.advance(f64::INFINITY).unwrap(), StepReport::default());
        assert_eq!(engine.advance(f64::NAN).unwrap(), StepReport::default());
        assert_eq!(engine.advance(0.25).unwrap().updates, 1);
    }

    #[test]
    fn requests_from_direct_enter_apply_before_first_update() {
        let log = Log::default();
        let mut engine = quarter_engine(Backends::headless());
        let parent = traced_scene("a", &log).with_subsystem(EnterChild {
            child: Some(traced_scene("b", &log)),
        });
        engine.enter_scene(parent).unwrap();
        engine.advance(0.25).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![Call::Init("a"), Call::Init("b"), Call::Update("b", 0.25)]
        );
        assert_eq!(engine.scene_depth(), 2);
    }

    #[test]
    fn sound_init_failure_still_tears_down() {
        let log = Log::default();
        let (backends, graphics, sound) = tracked_backends(false, true);
        let mut engine = quarter_engine(backends);

        let err = engine.run("test", 1, 1, traced_scene("main", &log)).unwrap_err();
        assert_eq!(err.to_string(), "sound: no device");
        assert_eq!(graphics.borrow().inits, 1);
        assert_eq!(graphics.borrow().cleanups, 1);
        // Sound never came up, so it is not cleaned up.
        assert_eq!(sound.borrow().cleanups, 0);
        assert!(engine.window().is_none());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn graphics_init_failure_skips_every_backend_cleanup() {
        let (backends, graphics, sound) = tracked_backends(true, false);
        let mut engine = quarter_engine(backends);

        let err = engine.run("test", 1, 1, Scene::new("main")).unwrap_err();
        assert_eq!(err.to_string(), "graphics: no adapter");
        assert_eq!(graphics.borrow().cleanups, 0);
        assert_eq!(sound.borrow().inits, 0);
        assert_eq!(sound.borrow().cleanups, 0);
        assert!(engine.window().is_none());
    }

    #[test]
    fn successful_run_cleans_up_each_backend_once() {
        let (backends, graphics, sound) = tracked_backends(false, false);
        let mut engine = quarter_engine(backends);
        let scene = Scene::new("main").with_subsystem(ExitAfter { updates: 0, limit: 1 });

        engine.run("test", 1, 1, scene).unwrap();
        assert_eq!(graphics.borrow().cleanups, 1);
        assert_eq!(sound.borrow().cleanups, 1);
    }
}
