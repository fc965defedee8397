//! # Queued TS sender
//!
//! [`TsSender`] turns encoded access units into transport packets, queues
//! them under backpressure and drains the queue onto a [`Transport`] from a
//! background task.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tssend::sender::{SenderEvent, TsSender, UdpTransport};
//! use tssend::SenderConfig;
//!
//! # async fn run() -> tssend::Result<()> {
//! let (sender, mut events) = TsSender::new(SenderConfig::default())?;
//! sender.set_video_info(&[0x67, 0x42, 0xc0, 0x1f], Some(&[0x68, 0xce, 0x3c, 0x80]), None)?;
//! sender.start(UdpTransport::connect("udp://127.0.0.1:9000").await?)?;
//!
//! sender.send_video_frame(&[0, 0, 0, 1, 0x65, 0x88], Duration::ZERO, true)?;
//! if let Some(SenderEvent::ConnectionFailed(reason)) = events.recv().await {
//!     eprintln!("connection failed: {}", reason);
//! }
//! sender.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod bitrate;
pub mod events;
pub mod queue;
pub mod transport;

pub use bitrate::BitrateEstimator;
pub use events::{SenderEvent, StreamingStats, Throughput};
pub use queue::{EntryKind, QueueEntry, SendQueue};
pub use transport::{Transport, UdpTransport};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::av::{CodecType, TransportPacket};
use crate::codec::h26x::ParameterSets;
use crate::config::SenderConfig;
use crate::error::{Result, TsError};
use crate::format::ts::packetizer::TableContinuity;
use crate::format::ts::{
    AudioPacketizer, InjectionPolicy, TableId, TablePacketizer, TableRegistry, TableToSend,
    VideoPacketizer,
};

/// How long the sender loop waits on an empty queue before rechecking.
const POLL_TIMEOUT: Duration = Duration::from_millis(50);
/// Throughput sample period.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Everything producers touch. The sender loop never locks it.
#[derive(Debug)]
struct Producer {
    video_enabled: bool,
    audio_enabled: bool,
    max_payload_size: usize,
    repeat_parameter_sets: bool,
    sample_rate: u32,
    stereo: bool,
    registry: TableRegistry,
    policy: InjectionPolicy,
    tables: TablePacketizer,
    video: VideoPacketizer,
    audio: AudioPacketizer,
}

impl Producer {
    fn new(config: &SenderConfig) -> Result<Self> {
        let max_payload_size = config.max_payload_size();
        Ok(Self {
            video_enabled: config.video_enabled,
            audio_enabled: config.audio_enabled,
            max_payload_size,
            repeat_parameter_sets: config.repeat_parameter_sets,
            sample_rate: 44100,
            stereo: true,
            registry: TableRegistry::new(),
            policy: InjectionPolicy::new(config.table_interval, config.description_interval),
            tables: TablePacketizer::new(max_payload_size)?,
            video: VideoPacketizer::new(config.video_codec, max_payload_size)?
                .with_repeated_parameter_sets(config.repeat_parameter_sets),
            audio: AudioPacketizer::new(config.audio_codec, max_payload_size)?,
        })
    }

    /// Registers one track per enabled stream and republishes the PMT.
    fn rebuild_tracks(&mut self) -> Result<()> {
        self.registry.reset();
        if self.video_enabled {
            self.registry.add_track(self.video.codec())?;
        }
        if self.audio_enabled {
            self.registry
                .add_track_with_descriptors(self.audio.codec(), self.audio.descriptors())?;
        }
        self.registry.rebuild()
    }

    /// Serializes the requested tables, PAT first.
    fn table_packets(&mut self, decision: TableToSend, increase_continuity: bool) -> Result<Vec<TransportPacket>> {
        let ids: &[TableId] = match decision {
            TableToSend::None => return Ok(Vec::new()),
            TableToSend::AssociationAndMap => &[TableId::Association, TableId::Map],
            TableToSend::Description => &[TableId::Description],
            TableToSend::All => &[TableId::Association, TableId::Map, TableId::Description],
        };
        let mut sections = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(section) = self.registry.current(id)? {
                sections.push((id, section));
            }
        }
        Ok(self.tables.write(&sections, increase_continuity))
    }

    /// Saves injection state so a frame that never gets queued can undo its
    /// table burst.
    fn checkpoint(&self) -> (InjectionPolicy, TableContinuity) {
        (self.policy.clone(), self.tables.snapshot())
    }

    fn rollback(&mut self, (policy, continuity): (InjectionPolicy, TableContinuity)) {
        self.policy = policy;
        self.tables.restore(continuity);
    }

    fn reset(&mut self) {
        self.registry.reset();
        self.policy.reset();
        self.tables.reset();
        self.video.reset(false);
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent_video: AtomicU64,
    sent_audio: AtomicU64,
    dropped_video: AtomicU64,
    dropped_audio: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.sent_video.store(0, Ordering::Relaxed);
        self.sent_audio.store(0, Ordering::Relaxed);
        self.dropped_video.store(0, Ordering::Relaxed);
        self.dropped_audio.store(0, Ordering::Relaxed);
    }
}

/// State shared with the background tasks.
#[derive(Debug)]
struct Shared {
    queue: SendQueue,
    running: AtomicBool,
    failed: AtomicBool,
    logging: AtomicBool,
    /// Bytes written since the last throughput sample.
    bytes_sent: AtomicU64,
    counters: Counters,
}

#[derive(Debug)]
struct Tasks {
    shutdown: watch::Sender<bool>,
    sender: JoinHandle<()>,
    sampler: JoinHandle<()>,
}

/// Packetizes access units and sends them from a background task.
///
/// All operations take `&self`; the sender can be shared across encoder
/// threads behind an `Arc`. Codec and service changes are only accepted
/// while stopped.
#[derive(Debug)]
pub struct TsSender {
    shared: Arc<Shared>,
    producer: Mutex<Producer>,
    tasks: Mutex<Option<Tasks>>,
    events: mpsc::UnboundedSender<SenderEvent>,
}

impl TsSender {
    /// Creates a stopped sender and the receiving end of its event channel.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `config` does not validate or
    /// names a codec no packetizer supports (G.711).
    pub fn new(config: SenderConfig) -> Result<(Self, mpsc::UnboundedReceiver<SenderEvent>)> {
        config.validate()?;
        let (events, receiver) = mpsc::unbounded_channel();
        let sender = Self {
            shared: Arc::new(Shared {
                queue: SendQueue::new(config.cache_size)?,
                running: AtomicBool::new(false),
                failed: AtomicBool::new(false),
                logging: AtomicBool::new(config.logging),
                bytes_sent: AtomicU64::new(0),
                counters: Counters::default(),
            }),
            producer: Mutex::new(Producer::new(&config)?),
            tasks: Mutex::new(None),
            events,
        };
        Ok((sender, receiver))
    }

    /// Starts streaming onto `transport`.
    ///
    /// Clears the queue, registers the configured tracks, queues the initial
    /// PAT/PMT/SDT burst and spawns the sender loop and the throughput
    /// sampler. Must be called from within a tokio runtime.
    pub fn start<T: Transport + 'static>(&self, transport: T) -> Result<()> {
        let mut guard = self.producer.lock();
        let producer = &mut *guard;
        if self.is_running() {
            return Err(TsError::Config("sender already running".into()));
        }

        self.shared.queue.clear();
        self.shared.failed.store(false, Ordering::SeqCst);
        self.shared.bytes_sent.store(0, Ordering::Relaxed);
        producer.policy.reset();
        producer.rebuild_tracks()?;
        let burst = producer.table_packets(TableToSend::All, false)?;
        producer.policy.mark_all_sent(&producer.registry, Instant::now());
        if self.shared.queue.push(QueueEntry::new(EntryKind::Tables, burst)).is_err() {
            warn!("initial table burst did not fit in the queue");
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let sender = tokio::spawn(run_sender(
            self.shared.clone(),
            Box::new(transport),
            shutdown_rx.clone(),
            self.events.clone(),
        ));
        let sampler = tokio::spawn(run_sampler(self.shared.clone(), shutdown_rx, self.events.clone()));
        *self.tasks.lock() = Some(Tasks {
            shutdown,
            sender,
            sampler,
        });
        self.shared.running.store(true, Ordering::SeqCst);
        debug!("sender started with {} tracks", producer.registry.tracks().len());
        Ok(())
    }

    /// Stops both background tasks and resets tables, packetizers, counters
    /// and the queue. Safe to call when not running.
    pub async fn stop(&self) {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            let _ = tasks.shutdown.send(true);
            let (sender, sampler) = futures::join!(tasks.sender, tasks.sampler);
            if let Err(e) = sender {
                warn!("sender task ended abnormally: {}", e);
            }
            if let Err(e) = sampler {
                warn!("sampler task ended abnormally: {}", e);
            }
        }

        let mut producer = self.producer.lock();
        self.shared.running.store(false, Ordering::SeqCst);
        producer.reset();
        self.shared.queue.clear();
        self.shared.counters.reset();
        self.shared.bytes_sent.store(0, Ordering::Relaxed);
        debug!("sender stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Updates the video parameter sets; they go out in front of the next
    /// keyframe. Accepted while running.
    pub fn set_video_info(&self, sps: &[u8], pps: Option<&[u8]>, vps: Option<&[u8]>) -> Result<()> {
        let mut producer = self.producer.lock();
        let sets = ParameterSets::new(producer.video.codec(), sps, pps, vps)?;
        producer.video.set_parameter_sets(sets)
    }

    /// Updates audio stream parameters.
    ///
    /// When running and the change alters the PMT (Opus channel count), the
    /// new map goes out before the next frame. PIDs and continuity counters
    /// are unaffected.
    pub fn set_audio_info(&self, sample_rate: u32, stereo: bool) -> Result<()> {
        let mut producer = self.producer.lock();
        let audio = AudioPacketizer::with_info(
            producer.audio.codec(),
            sample_rate,
            stereo,
            producer.max_payload_size,
        )?;
        if self.is_running() && producer.audio_enabled {
            let codec = audio.codec();
            if producer.registry.set_track_descriptors(codec, audio.descriptors())? {
                debug!("{} descriptors changed, map republished", codec);
            }
        }
        producer.audio = audio;
        producer.sample_rate = sample_rate;
        producer.stereo = stereo;
        Ok(())
    }

    /// Selects H.264 or H.265. Cached parameter sets are dropped.
    pub fn set_video_codec(&self, codec: CodecType) -> Result<()> {
        let mut producer = self.producer.lock();
        self.ensure_stopped("video codec")?;
        producer.video = VideoPacketizer::new(codec, producer.max_payload_size)?
            .with_repeated_parameter_sets(producer.repeat_parameter_sets);
        Ok(())
    }

    /// Selects AAC or Opus, keeping the last audio info.
    pub fn set_audio_codec(&self, codec: CodecType) -> Result<()> {
        let mut producer = self.producer.lock();
        self.ensure_stopped("audio codec")?;
        producer.audio =
            AudioPacketizer::with_info(codec, producer.sample_rate, producer.stereo, producer.max_payload_size)?;
        Ok(())
    }

    /// Sets the provider and service name advertised in the SDT.
    pub fn set_service_info(&self, provider: &str, name: &str) -> Result<()> {
        let mut producer = self.producer.lock();
        self.ensure_stopped("service info")?;
        producer.registry.set_service(provider, name)
    }

    fn ensure_stopped(&self, what: &str) -> Result<()> {
        if self.is_running() {
            return Err(TsError::Config(format!("cannot change {} while running", what)));
        }
        Ok(())
    }

    /// Queues one video access unit, preceded by any tables that are due.
    ///
    /// Frames are ignored while stopped or with video disabled. A full queue
    /// drops the frame and counts it. On error nothing is queued and table
    /// injection state is left as it was.
    pub fn send_video_frame(&self, data: &[u8], pts: Duration, is_key: bool) -> Result<()> {
        let mut guard = self.producer.lock();
        let producer = &mut *guard;
        if !self.is_running() || !producer.video_enabled {
            return Ok(());
        }
        let checkpoint = producer.checkpoint();
        let packets = Self::due_tables(producer, is_key).and_then(|tables| {
            let packets = producer.video.packetize(&mut producer.registry, data, pts, is_key)?;
            Ok((tables, packets))
        });
        match packets {
            Ok((tables, packets)) => {
                self.enqueue(producer, checkpoint, tables, EntryKind::Video, packets);
                Ok(())
            }
            Err(e) => {
                producer.rollback(checkpoint);
                Err(e)
            }
        }
    }

    /// Queues one audio access unit, preceded by any tables that are due.
    pub fn send_audio_frame(&self, data: &[u8], pts: Duration) -> Result<()> {
        let mut guard = self.producer.lock();
        let producer = &mut *guard;
        if !self.is_running() || !producer.audio_enabled {
            return Ok(());
        }
        let checkpoint = producer.checkpoint();
        let packets = Self::due_tables(producer, false).and_then(|tables| {
            let packets = producer.audio.packetize(&mut producer.registry, data, pts)?;
            Ok((tables, packets))
        });
        match packets {
            Ok((tables, packets)) => {
                self.enqueue(producer, checkpoint, tables, EntryKind::Audio, packets);
                Ok(())
            }
            Err(e) => {
                producer.rollback(checkpoint);
                Err(e)
            }
        }
    }

    fn due_tables(producer: &mut Producer, is_key: bool) -> Result<Vec<TransportPacket>> {
        let decision = producer.policy.should_send(is_key, &producer.registry);
        if decision != TableToSend::None {
            debug!("injecting tables: {:?}", decision);
        }
        producer.table_packets(decision, true)
    }

    fn enqueue(
        &self,
        producer: &mut Producer,
        checkpoint: (InjectionPolicy, TableContinuity),
        tables: Vec<TransportPacket>,
        kind: EntryKind,
        packets: Vec<TransportPacket>,
    ) {
        let queue = &self.shared.queue;
        if !tables.is_empty() && queue.push(QueueEntry::new(EntryKind::Tables, tables)).is_err() {
            // never sent; resend with the same counters on the next frame
            producer.rollback(checkpoint);
        }
        if queue.push(QueueEntry::new(kind, packets)).is_err() {
            let dropped = match kind {
                EntryKind::Audio => &self.shared.counters.dropped_audio,
                _ => &self.shared.counters.dropped_video,
            };
            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            info!("{:?} frame discarded, queue full ({} dropped)", kind, total);
        }
    }

    /// Changes the queue capacity, keeping queued entries.
    pub fn resize_cache(&self, size: usize) -> Result<()> {
        self.shared.queue.resize(size)
    }

    /// True when the queue is at least `percentage` full.
    pub fn has_congestion(&self, percentage: f32) -> Result<bool> {
        self.shared.queue.has_congestion(percentage)
    }

    pub fn get_cache_size(&self) -> usize {
        self.shared.queue.capacity()
    }

    pub fn get_items_in_cache(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn clear_cache(&self) {
        self.shared.queue.clear();
    }

    pub fn queued_bytes(&self) -> usize {
        self.shared.queue.queued_bytes()
    }

    pub fn get_sent_video_frames(&self) -> u64 {
        self.shared.counters.sent_video.load(Ordering::Relaxed)
    }

    pub fn get_sent_audio_frames(&self) -> u64 {
        self.shared.counters.sent_audio.load(Ordering::Relaxed)
    }

    pub fn get_dropped_video_frames(&self) -> u64 {
        self.shared.counters.dropped_video.load(Ordering::Relaxed)
    }

    pub fn get_dropped_audio_frames(&self) -> u64 {
        self.shared.counters.dropped_audio.load(Ordering::Relaxed)
    }

    pub fn reset_sent_video_frames(&self) {
        self.shared.counters.sent_video.store(0, Ordering::Relaxed);
    }

    pub fn reset_sent_audio_frames(&self) {
        self.shared.counters.sent_audio.store(0, Ordering::Relaxed);
    }

    pub fn reset_dropped_video_frames(&self) {
        self.shared.counters.dropped_video.store(0, Ordering::Relaxed);
    }

    pub fn reset_dropped_audio_frames(&self) {
        self.shared.counters.dropped_audio.store(0, Ordering::Relaxed);
    }

    /// Enables per-packet info logs.
    pub fn set_logging(&self, enabled: bool) {
        self.shared.logging.store(enabled, Ordering::Relaxed);
    }
}

/// Drains the queue onto the transport until shutdown or the first failed
/// write.
async fn run_sender(
    shared: Arc<Shared>,
    mut transport: Box<dyn Transport>,
    mut shutdown: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<SenderEvent>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            sent = send_next(&shared, transport.as_mut(), &events) => {
                if !sent {
                    return;
                }
            }
        }
    }
    debug!("sender loop finished");
}

/// Writes the next queued entry, if one arrives in time. Returns false once
/// the transport has failed.
async fn send_next(
    shared: &Shared,
    transport: &mut dyn Transport,
    events: &mpsc::UnboundedSender<SenderEvent>,
) -> bool {
    let Some(entry) = shared.queue.pop_wait(POLL_TIMEOUT).await else {
        return true;
    };

    for packet in &entry.packets {
        match transport.write(&packet.data).await {
            Ok(written) => {
                shared.bytes_sent.fetch_add(written as u64, Ordering::Relaxed);
                if shared.logging.load(Ordering::Relaxed) {
                    info!(
                        "wrote {:?} packet ({:?}), size: {}",
                        packet.kind, packet.position, written
                    );
                }
            }
            Err(e) => {
                error!("transport write failed: {}", e);
                shared.failed.store(true, Ordering::SeqCst);
                let _ = events.send(SenderEvent::ConnectionFailed(e.to_string()));
                return false;
            }
        }
    }

    match entry.kind {
        EntryKind::Video => {
            shared.counters.sent_video.fetch_add(1, Ordering::Relaxed);
        }
        EntryKind::Audio => {
            shared.counters.sent_audio.fetch_add(1, Ordering::Relaxed);
        }
        EntryKind::Tables => {}
    }
    true
}

/// Reports bitrate and throughput once per second.
async fn run_sampler(
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<SenderEvent>,
) {
    let mut estimator = BitrateEstimator::new();
    let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
    ticker.tick().await;
    let mut last = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if shared.failed.load(Ordering::SeqCst) {
            break;
        }
        let now = tokio::time::Instant::now();
        let stats = estimator.sample(
            shared.bytes_sent.swap(0, Ordering::Relaxed),
            shared.queue.queued_bytes() as u64,
            now - last,
        );
        last = now;
        if events.send(SenderEvent::StreamingStats(stats)).is_err() {
            break;
        }
    }
}
