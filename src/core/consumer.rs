//! The consumer thread
//!
//! One per logger. It owns every output device and the reader half of every
//! sink's ring buffer. Each cycle it applies pending commands, refreshes the
//! coarse clock and visits the sinks round-robin, handling at most
//! `batch_size` records per visit. When a cycle finds nothing to do it
//! flushes the devices it wrote to and waits according to its
//! [`WaitStrategy`].

use super::clock;
use super::error::{LoggerError, Result};
use super::log_level::LogLevel;
use super::metrics::LoggerMetrics;
use super::record::Record;
use super::registry::Registry;
use super::render::Renderer;
use super::sink::SinkQueue;
use crate::outputs::{OutputDevice, OutputId};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default number of records handled per sink visit
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Called with every consumer-side error; replaces the stderr diagnostic
pub type ErrorHook = Arc<dyn Fn(&LoggerError) + Send + Sync>;

/// Called with the sink name after a sync completed on its device
pub type FlushHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Called with the device name after it was reopened
pub type ReopenHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Called with the sink name and its cumulative dropped count after the
/// consumer reported new drops
pub type OverflowCallback = Arc<dyn Fn(&str, u64) + Send + Sync>;

/// What the consumer does when a cycle found no work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitStrategy {
    /// Sleep, waking early for commands
    Sleep(Duration),
    /// Give up the time slice
    Yield,
    /// Busy-wait; only sensible on a dedicated core
    Spin,
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::Sleep(Duration::from_millis(1))
    }
}

#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) on_flush: Option<FlushHook>,
    pub(crate) on_reopen: Option<ReopenHook>,
    pub(crate) on_overflow: Option<OverflowCallback>,
}

pub(crate) enum Command {
    AddOutput {
        id: OutputId,
        device: Box<dyn OutputDevice>,
    },
    AddSink(SinkQueue),
    /// Close an output that no sink ended up using
    DiscardOutput(OutputId),
    /// Drain every sink, then reopen every device
    ReopenAll(Sender<Result<()>>),
    /// Stop once every sink is closed, force-closing the rest at `deadline`
    Shutdown { deadline: Instant },
}

struct SinkSlot {
    queue: SinkQueue,
    /// Name as of the last processed rename record
    name: String,
    output: OutputId,
    reported_dropped: u64,
    failing: bool,
}

struct OutputSlot {
    device: Box<dyn OutputDevice>,
    users: usize,
    dirty: bool,
}

/// What a frame turned out to be, once its payload is released
enum Event {
    Log(LogLevel),
    Sync(u64),
    Close,
    Reopen,
    SetName(String),
    /// A log record flagged at encoding time, already counted as dropped
    Discarded,
    Corrupt(LoggerError),
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Output devices and the error reporting around them
struct Devices {
    slots: HashMap<OutputId, OutputSlot>,
    hooks: Hooks,
    metrics: Arc<LoggerMetrics>,
}

impl Devices {
    /// Run a device operation, turning a panic into an error
    fn guarded<F>(slot: &mut OutputSlot, op: F) -> Result<()>
    where
        F: FnOnce(&mut dyn OutputDevice) -> Result<()>,
    {
        let device = &mut slot.device;
        match catch_unwind(AssertUnwindSafe(|| op(device.as_mut()))) {
            Ok(result) => result,
            Err(panic) => Err(LoggerError::other(format!(
                "Output '{}' panicked: {}",
                slot.device.name(),
                panic_message(panic.as_ref())
            ))),
        }
    }

    fn report(&self, error: &LoggerError) {
        self.metrics.record_io_error();
        match self.hooks.on_error {
            Some(ref hook) => hook(error),
            None => eprintln!("[LOGGER ERROR] {}", error),
        }
    }

    /// Report an error against a sink's health
    fn report_for(&self, sink: &mut SinkSlot, error: &LoggerError) {
        sink.queue.shared.record_io_error(error);
        sink.failing = true;
        self.report(error);
    }

    fn missing(id: OutputId) -> LoggerError {
        LoggerError::other(format!("Output {} is not registered", id))
    }

    fn write(&mut self, sink: &mut SinkSlot, level: LogLevel, bytes: &[u8]) {
        let result = match self.slots.get_mut(&sink.output) {
            Some(slot) => {
                slot.dirty = true;
                Self::guarded(slot, |d| d.write(level, bytes))
            }
            None => Err(Self::missing(sink.output)),
        };
        match result {
            Ok(()) => {
                self.metrics.record_written();
                if sink.failing {
                    sink.failing = false;
                    sink.queue.shared.record_recovery();
                }
            }
            Err(e) => self.report_for(sink, &e),
        }
    }

    fn sync(&mut self, sink: &mut SinkSlot) {
        let result = match self.slots.get_mut(&sink.output) {
            Some(slot) => {
                slot.dirty = false;
                Self::guarded(slot, |d| d.sync())
            }
            None => Err(Self::missing(sink.output)),
        };
        match result {
            Ok(()) => {
                self.metrics.record_sync();
                if let Some(ref hook) = self.hooks.on_flush {
                    hook(&sink.name);
                }
            }
            Err(e) => self.report_for(sink, &e),
        }
    }

    fn reopen_one(&mut self, id: OutputId) -> Result<()> {
        let slot = self.slots.get_mut(&id).ok_or_else(|| Self::missing(id))?;
        slot.dirty = false;
        Self::guarded(slot, |d| {
            d.flush()?;
            d.reopen()
        })?;
        self.metrics.record_reopen();
        if let Some(ref hook) = self.hooks.on_reopen {
            hook(slot.device.name());
        }
        Ok(())
    }

    fn reopen(&mut self, sink: &mut SinkSlot) {
        if let Err(e) = self.reopen_one(sink.output) {
            self.report_for(sink, &e);
        }
    }

    fn reopen_all(&mut self) -> Result<()> {
        let mut ids: Vec<OutputId> = self.slots.keys().copied().collect();
        ids.sort();
        let mut first_error = None;
        for id in ids {
            if let Err(e) = self.reopen_one(id) {
                self.report(&e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn acquire(&mut self, id: OutputId) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                slot.users += 1;
                true
            }
            None => false,
        }
    }

    /// A sink stopped using `id`; close the device once nobody uses it
    fn release(&mut self, id: OutputId) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        slot.users = slot.users.saturating_sub(1);
        let result = if slot.users == 0 && id != OutputId::DEFAULT {
            let result = Self::guarded(slot, |d| d.close());
            self.slots.remove(&id);
            result
        } else {
            slot.dirty = false;
            Self::guarded(slot, |d| d.flush())
        };
        if let Err(e) = result {
            self.report(&e);
        }
    }

    /// Close `id` if no sink acquired it
    fn discard(&mut self, id: OutputId) {
        if id == OutputId::DEFAULT {
            return;
        }
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        if slot.users > 0 {
            return;
        }
        let result = Self::guarded(slot, |d| d.close());
        self.slots.remove(&id);
        if let Err(e) = result {
            self.report(&e);
        }
    }

    fn flush_dirty(&mut self) {
        let mut errors = Vec::new();
        for slot in self.slots.values_mut().filter(|s| s.dirty) {
            slot.dirty = false;
            match Self::guarded(slot, |d| d.flush()) {
                Ok(()) => {
                    self.metrics.record_flush();
                }
                Err(e) => errors.push(e),
            }
        }
        for e in errors {
            self.report(&e);
        }
    }

    fn close_all(&mut self) {
        let mut errors = Vec::new();
        for (_, mut slot) in self.slots.drain() {
            if let Err(e) = Self::guarded(&mut slot, |d| d.close()) {
                errors.push(e);
            }
        }
        for e in errors {
            self.report(&e);
        }
    }
}

pub(crate) struct ConsumerSettings {
    pub(crate) renderer: Renderer,
    pub(crate) wait: WaitStrategy,
    pub(crate) batch_size: usize,
    pub(crate) hooks: Hooks,
}

pub(crate) struct Consumer {
    commands: Receiver<Command>,
    sinks: Vec<SinkSlot>,
    devices: Devices,
    renderer: Renderer,
    line: String,
    wait: WaitStrategy,
    batch_size: usize,
    registry: Arc<Registry>,
    shutdown: Option<Instant>,
}

impl Consumer {
    pub(crate) fn new(
        commands: Receiver<Command>,
        default_output: Box<dyn OutputDevice>,
        settings: ConsumerSettings,
        registry: Arc<Registry>,
        metrics: Arc<LoggerMetrics>,
    ) -> Self {
        let mut slots = HashMap::new();
        slots.insert(
            OutputId::DEFAULT,
            OutputSlot {
                device: default_output,
                users: 0,
                dirty: false,
            },
        );
        Self {
            commands,
            sinks: Vec::new(),
            devices: Devices {
                slots,
                hooks: settings.hooks,
                metrics,
            },
            renderer: settings.renderer,
            line: String::with_capacity(256),
            wait: settings.wait,
            batch_size: settings.batch_size.max(1),
            registry,
            shutdown: None,
        }
    }

    /// Run until shutdown; returns whether every sink was closed by its
    /// owners before the deadline
    pub(crate) fn run(mut self) -> bool {
        let graceful = loop {
            self.apply_commands();
            clock::refresh_coarse();

            let worked = self.cycle(self.batch_size);

            if let Some(deadline) = self.shutdown {
                if self.sinks.is_empty() {
                    break true;
                }
                if Instant::now() >= deadline {
                    self.force_close_all();
                    break false;
                }
            }

            if !worked {
                self.devices.flush_dirty();
                self.idle();
            }
        };

        self.finish();
        graceful
    }

    fn apply_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    if self.shutdown.is_none() {
                        self.shutdown = Some(Instant::now());
                    }
                    return;
                }
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::AddOutput { id, device } => {
                self.devices.slots.insert(
                    id,
                    OutputSlot {
                        device,
                        users: 0,
                        dirty: false,
                    },
                );
            }
            Command::AddSink(queue) => {
                let output = queue.shared.output();
                if !self.devices.acquire(output) {
                    self.devices.report(&Devices::missing(output));
                    self.registry.remove(&queue.shared);
                    return;
                }
                self.sinks.push(SinkSlot {
                    name: queue.shared.name(),
                    output,
                    reported_dropped: 0,
                    failing: false,
                    queue,
                });
            }
            Command::DiscardOutput(id) => self.devices.discard(id),
            Command::ReopenAll(reply) => {
                self.cycle(usize::MAX);
                let _ = reply.send(self.devices.reopen_all());
            }
            Command::Shutdown { deadline } => {
                self.shutdown = Some(self.shutdown.map_or(deadline, |d| d.min(deadline)));
            }
        }
    }

    fn idle(&mut self) {
        match self.wait {
            WaitStrategy::Sleep(duration) => match self.commands.recv_timeout(duration) {
                Ok(command) => self.apply(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if self.shutdown.is_none() {
                        self.shutdown = Some(Instant::now());
                    }
                    // nothing left to wake us up early
                    std::thread::sleep(duration);
                }
            },
            WaitStrategy::Yield => std::thread::yield_now(),
            WaitStrategy::Spin => std::hint::spin_loop(),
        }
    }

    /// Visit every sink once; true if any record was handled
    fn cycle(&mut self, limit: usize) -> bool {
        let mut worked = false;
        let mut index = 0;
        while index < self.sinks.len() {
            let (handled, closed) = self.process_sink(index, limit);
            worked |= handled > 0;
            if closed {
                let slot = self.sinks.remove(index);
                self.retire(slot);
            } else {
                index += 1;
            }
        }
        worked
    }

    /// Handle up to `limit` records of one sink; returns how many were
    /// handled and whether the sink's close record was among them
    fn process_sink(&mut self, index: usize, limit: usize) -> (usize, bool) {
        let Self {
            sinks,
            devices,
            renderer,
            line,
            ..
        } = self;
        let sink = &mut sinks[index];

        let mut handled = 0;
        while handled < limit {
            line.clear();
            let name = sink.name.as_str();
            let event = sink
                .queue
                .reader
                .read(|tag, payload| decode(renderer, line, name, tag, payload));
            let Some(event) = event else {
                report_drops(devices, renderer, line, sink);
                break;
            };
            handled += 1;

            match event {
                Event::Log(level) => devices.write(sink, level, line.as_bytes()),
                Event::Sync(seq) => {
                    devices.sync(sink);
                    sink.queue.shared.complete_sync(seq);
                }
                Event::Close => {
                    report_drops(devices, renderer, line, sink);
                    return (handled, true);
                }
                Event::Reopen => devices.reopen(sink),
                Event::SetName(name) => sink.name = name,
                Event::Discarded => {}
                Event::Corrupt(e) => devices.report_for(sink, &e),
            }
        }
        (handled, false)
    }

    /// Drop a closed sink and release its device
    fn retire(&mut self, slot: SinkSlot) {
        self.devices.release(slot.output);
        self.registry.remove(&slot.queue.shared);
    }

    /// Drain and close sinks whose handles outlived the shutdown deadline
    fn force_close_all(&mut self) {
        for slot in std::mem::take(&mut self.sinks) {
            eprintln!(
                "[LOGGER WARNING] Sink '{}' still open at shutdown, closing it",
                slot.name
            );
            slot.queue.shared.force_close();
            self.sinks.push(slot);
        }
        // records published before the flag was seen are still written
        self.cycle(usize::MAX);
        for slot in std::mem::take(&mut self.sinks) {
            self.retire(slot);
        }
    }

    fn finish(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            if let Command::ReopenAll(reply) = command {
                let _ = reply.send(Err(LoggerError::LoggerStopped));
            }
        }
        self.devices.close_all();
    }
}

fn decode(renderer: &mut Renderer, line: &mut String, name: &str, tag: u32, payload: &[u8]) -> Event {
    // SAFETY: a sink's buffer only holds frames written by its own encoders
    match unsafe { Record::decode(tag, payload) } {
        Ok(Record::Log(record)) if record.is_malformed() => {
            record.release();
            Event::Discarded
        }
        Ok(Record::Log(record)) => match record.args() {
            Ok(args) => {
                renderer.render_log(line, name, &record, &args);
                Event::Log(record.level)
            }
            Err(e) => Event::Corrupt(e),
        },
        Ok(Record::Sync(seq)) => Event::Sync(seq),
        Ok(Record::Close) => Event::Close,
        Ok(Record::Reopen) => Event::Reopen,
        Ok(Record::SetName(name)) => Event::SetName(name.to_string()),
        Err(e) => Event::Corrupt(e),
    }
}

/// Write the "messages dropped" warning if the sink dropped records since
/// the last report
fn report_drops(devices: &mut Devices, renderer: &mut Renderer, line: &mut String, sink: &mut SinkSlot) {
    let dropped = sink.queue.shared.dropped_count();
    if dropped <= sink.reported_dropped {
        return;
    }
    line.clear();
    renderer.render_dropped(line, &sink.name, dropped - sink.reported_dropped);
    sink.reported_dropped = dropped;
    devices.write(sink, LogLevel::Warn, line.as_bytes());
    if let Some(ref callback) = devices.hooks.on_overflow {
        callback(&sink.name, dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::CallSite;
    use crate::core::log_level::LevelStyle;
    use crate::core::render::OutputFormat;
    use crate::core::sink::{Sink, SinkConfig, SinkHandle, SinkShared};
    use crate::core::timestamp::TimestampFormat;
    use crate::outputs::MemoryOutput;
    use crossbeam_channel::unbounded;

    static MSG: CallSite = CallSite::new("value={}", "src/job.rs", 7, "job", 1);

    struct Harness {
        consumer: Consumer,
        output: MemoryOutput,
        registry: Arc<Registry>,
        metrics: Arc<LoggerMetrics>,
        _commands: Sender<Command>,
    }

    fn harness(hooks: Hooks) -> Harness {
        let (tx, rx) = unbounded();
        let output = MemoryOutput::new();
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(LoggerMetrics::new());
        let settings = ConsumerSettings {
            renderer: Renderer::new(
                OutputFormat::Text,
                TimestampFormat::Unix,
                LevelStyle::Letter,
                clock::DEFAULT_CALIBRATION_INTERVAL,
            ),
            wait: WaitStrategy::default(),
            batch_size: 2,
            hooks,
        };
        let consumer = Consumer::new(
            rx,
            Box::new(output.clone()),
            settings,
            Arc::clone(&registry),
            Arc::clone(&metrics),
        );
        Harness {
            consumer,
            output,
            registry,
            metrics,
            _commands: tx,
        }
    }

    fn add_sink(h: &mut Harness, name: &str, config: SinkConfig) -> Sink {
        let (shared, reader) = SinkShared::new(
            name.to_string(),
            config,
            OutputId::DEFAULT,
            Arc::downgrade(&h.registry),
            Arc::clone(&h.metrics),
        );
        let handle = Arc::new(SinkHandle {
            shared: Arc::clone(&shared),
        });
        h.registry.insert(&handle).unwrap();
        h.consumer.apply(Command::AddSink(SinkQueue { shared, reader }));
        Sink::from_handle(handle)
    }

    fn messages(output: &MemoryOutput) -> Vec<String> {
        output
            .lines()
            .iter()
            .map(|l| l.splitn(3, ' ').nth(2).unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_batches_round_robin() {
        let mut h = harness(Hooks::default());
        let a = add_sink(&mut h, "a", SinkConfig::default());
        let b = add_sink(&mut h, "b", SinkConfig::default());
        for i in 0..3 {
            a.log(LogLevel::Info, &MSG, (i,));
            b.log(LogLevel::Info, &MSG, (i,));
        }

        assert!(h.consumer.cycle(2));
        assert_eq!(
            messages(&h.output),
            vec![
                "a job.rs:7: value=0",
                "a job.rs:7: value=1",
                "b job.rs:7: value=0",
                "b job.rs:7: value=1",
            ]
        );
        assert!(h.consumer.cycle(2));
        assert!(!h.consumer.cycle(2));
        assert_eq!(h.metrics.written_count(), 6);
    }

    #[test]
    fn test_rename_applies_in_order() {
        let mut h = harness(Hooks::default());
        let sink = add_sink(&mut h, "old", SinkConfig::default());
        sink.log(LogLevel::Info, &MSG, (1,));
        sink.set_name("new").unwrap();
        sink.log(LogLevel::Info, &MSG, (2,));

        while h.consumer.cycle(usize::MAX) {}
        assert_eq!(
            messages(&h.output),
            vec!["old job.rs:7: value=1", "new job.rs:7: value=2"]
        );
        assert_eq!(h.registry.infos()[0].name, "new");
    }

    #[test]
    fn test_close_removes_sink_from_registry() {
        let mut h = harness(Hooks::default());
        let sink = add_sink(&mut h, "gone", SinkConfig::default());
        assert_eq!(h.registry.len(), 1);
        sink.close();

        h.consumer.cycle(usize::MAX);
        assert!(h.consumer.sinks.is_empty());
        assert_eq!(h.registry.len(), 0);
    }

    #[test]
    fn test_dropped_records_are_reported() {
        let overflows = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = Arc::clone(&overflows);
        let hooks = Hooks {
            on_overflow: Some(Arc::new(move |name: &str, total: u64| {
                seen.lock().push((name.to_string(), total))
            })),
            ..Hooks::default()
        };
        let mut h = harness(hooks);
        let sink = add_sink(
            &mut h,
            "net",
            SinkConfig {
                capacity: 64,
                ..SinkConfig::default()
            },
        );
        sink.try_log(LogLevel::Info, &MSG, (1,));
        sink.try_log(LogLevel::Info, &MSG, (2,));
        sink.try_log(LogLevel::Info, &MSG, (3,));
        assert_eq!(sink.dropped_count(), 2);

        while h.consumer.cycle(usize::MAX) {}
        let lines = h.output.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("value=1"));
        assert!(lines[1].starts_with("W "));
        assert!(lines[1].ends_with("net: 2 messages dropped"));
        assert_eq!(*overflows.lock(), vec![("net".to_string(), 2)]);
    }

    #[test]
    fn test_device_errors_mark_health_and_continue() {
        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        let hooks = Hooks {
            on_error: Some(Arc::new(move |e: &LoggerError| seen.lock().push(e.to_string()))),
            ..Hooks::default()
        };
        let mut h = harness(hooks);
        let failing = crate::outputs::CallbackOutput::new("broken", |_, _| {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "device gone"))
        });
        let id = OutputId(1);
        h.consumer.apply(Command::AddOutput {
            id,
            device: Box::new(failing),
        });

        let (shared, reader) = SinkShared::new(
            "bad".to_string(),
            SinkConfig::default(),
            id,
            Arc::downgrade(&h.registry),
            Arc::clone(&h.metrics),
        );
        let handle = Arc::new(SinkHandle {
            shared: Arc::clone(&shared),
        });
        h.consumer.apply(Command::AddSink(SinkQueue { shared, reader }));
        let bad = Sink::from_handle(handle);
        let good = add_sink(&mut h, "good", SinkConfig::default());

        bad.log(LogLevel::Error, &MSG, (1,));
        good.log(LogLevel::Error, &MSG, (2,));
        while h.consumer.cycle(usize::MAX) {}

        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].contains("device gone"));
        assert!(!bad.health().is_healthy());
        assert_eq!(bad.health().io_errors, 1);
        assert!(good.health().is_healthy());
        assert_eq!(messages(&h.output), vec!["good job.rs:7: value=2"]);
        assert_eq!(h.metrics.io_error_count(), 1);
    }

    #[test]
    fn test_dedicated_output_closes_with_last_user() {
        let mut h = harness(Hooks::default());
        let dedicated = MemoryOutput::new();
        let id = OutputId(3);
        h.consumer.apply(Command::AddOutput {
            id,
            device: Box::new(dedicated.clone()),
        });
        let (shared, reader) = SinkShared::new(
            "own".to_string(),
            SinkConfig::default(),
            id,
            Arc::downgrade(&h.registry),
            Arc::clone(&h.metrics),
        );
        let handle = Arc::new(SinkHandle {
            shared: Arc::clone(&shared),
        });
        h.consumer.apply(Command::AddSink(SinkQueue { shared, reader }));
        let sink = Sink::from_handle(handle);

        sink.log(LogLevel::Info, &MSG, (5,));
        sink.close();
        while h.consumer.cycle(usize::MAX) {}

        assert_eq!(messages(&dedicated), vec!["own job.rs:7: value=5"]);
        assert!(!h.consumer.devices.slots.contains_key(&id));
        assert!(h.consumer.devices.slots.contains_key(&OutputId::DEFAULT));
    }

    #[test]
    fn test_unused_output_is_discarded() {
        let mut h = harness(Hooks::default());
        let id = OutputId(4);
        h.consumer.apply(Command::AddOutput {
            id,
            device: Box::new(MemoryOutput::new()),
        });
        h.consumer.apply(Command::DiscardOutput(id));
        assert!(!h.consumer.devices.slots.contains_key(&id));

        // outputs in use and the default output stay
        let used = OutputId(5);
        h.consumer.apply(Command::AddOutput {
            id: used,
            device: Box::new(MemoryOutput::new()),
        });
        let (shared, reader) = SinkShared::new(
            "user".to_string(),
            SinkConfig::default(),
            used,
            Arc::downgrade(&h.registry),
            Arc::clone(&h.metrics),
        );
        let _handle = Arc::new(SinkHandle {
            shared: Arc::clone(&shared),
        });
        h.consumer.apply(Command::AddSink(SinkQueue { shared, reader }));
        h.consumer.apply(Command::DiscardOutput(used));
        h.consumer.apply(Command::DiscardOutput(OutputId::DEFAULT));
        assert!(h.consumer.devices.slots.contains_key(&used));
        assert!(h.consumer.devices.slots.contains_key(&OutputId::DEFAULT));
    }

    #[test]
    fn test_shutdown_force_closes_after_deadline() {
        let mut h = harness(Hooks::default());
        let sink = add_sink(&mut h, "stuck", SinkConfig::default());
        sink.log(LogLevel::Info, &MSG, (9,));
        h.consumer.apply(Command::Shutdown {
            deadline: Instant::now(),
        });

        let output = h.output.clone();
        let graceful = h.consumer.run();
        assert!(!graceful);
        assert!(!sink.is_open());
        assert_eq!(messages(&output), vec!["stuck job.rs:7: value=9"]);
    }

    #[test]
    fn test_shutdown_is_graceful_when_sinks_closed() {
        let mut h = harness(Hooks::default());
        let sink = add_sink(&mut h, "done", SinkConfig::default());
        sink.log(LogLevel::Info, &MSG, (1,));
        drop(sink);
        h.consumer.apply(Command::Shutdown {
            deadline: Instant::now() + Duration::from_secs(5),
        });
        assert!(h.consumer.run());
        assert_eq!(h.output.lines().len(), 1);
    }
}
