use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tssend::av::CodecType;
use tssend::error::{Result, TsError};
use tssend::format::ts::{TSHeader, PID_PAT, PID_PMT, PID_SDT, TS_PACKET_SIZE};
use tssend::sender::{SenderEvent, Throughput, Transport, TsSender};
use tssend::SenderConfig;

const SPS: [u8; 4] = [0x67, 0x42, 0xc0, 0x1f];
const PPS: [u8; 4] = [0x68, 0xce, 0x3c, 0x80];
const IDR: [u8; 8] = [0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00];

/// Records every write; fails once `fail_after` writes have gone through.
#[derive(Clone, Default)]
struct MemoryTransport {
    writes: Arc<Mutex<Vec<Bytes>>>,
    fail_after: Option<usize>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut writes = self.writes.lock();
        if self.fail_after.is_some_and(|limit| writes.len() >= limit) {
            return Err(TsError::Transport("connection reset".into()));
        }
        writes.push(Bytes::copy_from_slice(data));
        Ok(data.len())
    }
}

fn config() -> SenderConfig {
    SenderConfig {
        logging: false,
        ..Default::default()
    }
}

async fn wait_for_writes(writes: &Arc<Mutex<Vec<Bytes>>>, count: usize) -> Vec<Bytes> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while writes.lock().len() < count {
        assert!(Instant::now() < deadline, "only {} writes arrived", writes.lock().len());
        sleep(Duration::from_millis(5)).await;
    }
    writes.lock().clone()
}

fn headers(write: &[u8]) -> Vec<TSHeader> {
    write
        .chunks(TS_PACKET_SIZE)
        .map(|ts| TSHeader::parse(ts).expect("sync byte"))
        .collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[tokio::test]
async fn test_stream_starts_with_tables_then_media() {
    let (sender, _events) = TsSender::new(config()).unwrap();
    sender.set_video_info(&SPS, Some(&PPS), None).unwrap();
    sender.set_service_info("acme", "camera one").unwrap();

    let transport = MemoryTransport::default();
    let writes = transport.writes.clone();
    sender.start(transport).unwrap();

    sender.send_video_frame(&IDR, Duration::from_millis(0), true).unwrap();
    sender.send_audio_frame(&[0x21, 0x10, 0x05], Duration::from_millis(10)).unwrap();
    sender.send_video_frame(&[0, 0, 0, 1, 0x41, 0x9a], Duration::from_millis(33), false).unwrap();

    let written = wait_for_writes(&writes, 4).await;
    assert_eq!(written.len(), 4);

    // initial burst: PAT, PMT, SDT in one transport packet
    let burst = headers(&written[0]);
    assert_eq!(
        burst.iter().map(|h| h.pid).collect::<Vec<_>>(),
        vec![PID_PAT, PID_PMT, PID_SDT]
    );
    assert!(burst.iter().all(|h| h.continuity_counter == 0));
    assert!(contains(&written[0], b"camera one"));

    // keyframe carries the parameter sets and a PCR on the video PID
    let key = &written[1];
    let header = TSHeader::parse(key).unwrap();
    assert_eq!(header.pid, 0x100);
    assert!(header.payload_unit_start);
    assert_eq!(key[5] & 0x50, 0x50);
    assert!(contains(key, &[0, 0, 0, 1, 0x67, 0x42, 0xc0, 0x1f, 0, 0, 0, 1, 0x68]));

    assert_eq!(TSHeader::parse(&written[2]).unwrap().pid, 0x101);
    let delta = TSHeader::parse(&written[3]).unwrap();
    assert_eq!((delta.pid, delta.continuity_counter), (0x100, 1));
    assert!(!contains(&written[3], &SPS));

    assert_eq!(sender.get_sent_video_frames(), 2);
    assert_eq!(sender.get_sent_audio_frames(), 1);
    assert_eq!(sender.get_dropped_video_frames(), 0);

    sender.stop().await;
    assert_eq!(sender.get_sent_video_frames(), 0);
    assert_eq!(sender.get_items_in_cache(), 0);
}

#[tokio::test]
async fn test_restart_republishes_tables() {
    let (sender, _events) = TsSender::new(config()).unwrap();
    let transport = MemoryTransport::default();
    let writes = transport.writes.clone();

    sender.start(transport.clone()).unwrap();
    wait_for_writes(&writes, 1).await;
    sender.stop().await;

    sender.set_audio_codec(CodecType::OPUS).unwrap();
    sender.start(transport).unwrap();
    sender.send_audio_frame(&[0xfc, 0xff, 0xfe], Duration::ZERO).unwrap();
    let written = wait_for_writes(&writes, 3).await;

    // new PMT version and the Opus registration descriptor
    let pmt = &written[1][TS_PACKET_SIZE..2 * TS_PACKET_SIZE];
    assert_eq!(TSHeader::parse(pmt).unwrap().pid, PID_PMT);
    assert_eq!((pmt[10] >> 1) & 0x1f, 1);
    assert!(contains(pmt, b"Opus"));
    assert!(contains(&written[2], &[0x7f, 0xe0, 3, 0xfc, 0xff, 0xfe]));
    sender.stop().await;
}

fn counters_on(written: &[Bytes], pid: u16) -> Vec<u8> {
    written
        .iter()
        .flat_map(|w| headers(w))
        .filter(|h| h.pid == pid)
        .map(|h| h.continuity_counter)
        .collect()
}

#[tokio::test]
async fn test_audio_info_change_keeps_continuity() {
    let (sender, _events) = TsSender::new(SenderConfig {
        audio_codec: CodecType::OPUS,
        table_interval: Duration::from_secs(60),
        ..config()
    })
    .unwrap();
    let transport = MemoryTransport::default();
    let writes = transport.writes.clone();
    sender.start(transport).unwrap();

    for i in 0..5u64 {
        sender
            .send_video_frame(&[0, 0, 0, 1, 0x41, i as u8], Duration::from_millis(i * 33), false)
            .unwrap();
    }
    sender.set_audio_info(48000, false).unwrap();
    sender
        .send_video_frame(&[0, 0, 0, 1, 0x41, 5], Duration::from_millis(165), false)
        .unwrap();
    sender.send_audio_frame(&[0xfc, 0xff], Duration::from_millis(165)).unwrap();
    let written = wait_for_writes(&writes, 9).await;

    assert_eq!(counters_on(&written, 0x100), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(counters_on(&written, 0x101), vec![0]);

    // PAT and PMT go out again ahead of the next frame
    let republished = &written[6];
    assert_eq!(
        headers(republished).iter().map(|h| h.pid).collect::<Vec<_>>(),
        vec![PID_PAT, PID_PMT]
    );
    let pmt = &republished[TS_PACKET_SIZE..];
    assert_eq!((pmt[10] >> 1) & 0x1f, 1);
    assert!(contains(pmt, &[0x7f, 2, 0x80, 1]));
    assert_eq!(counters_on(&written, PID_PMT), vec![0, 1]);
    sender.stop().await;
}

#[tokio::test]
async fn test_rejected_frames_leave_table_counters() {
    let (sender, _events) = TsSender::new(config()).unwrap();
    let transport = MemoryTransport::default();
    let writes = transport.writes.clone();
    sender.start(transport).unwrap();
    sleep(Duration::from_millis(300)).await;

    assert!(sender.send_video_frame(&[], Duration::ZERO, true).is_err());
    assert!(sender.send_audio_frame(&[0x21; 9000], Duration::ZERO).is_err());
    sender.send_video_frame(&IDR, Duration::from_millis(40), true).unwrap();
    sender.send_audio_frame(&[0x21, 0x10], Duration::from_millis(40)).unwrap();
    let written = wait_for_writes(&writes, 4).await;

    for pid in [PID_PAT, PID_PMT, PID_SDT] {
        assert_eq!(counters_on(&written, pid), vec![0, 1]);
    }
    assert_eq!(counters_on(&written, 0x100), vec![0]);
    assert_eq!(counters_on(&written, 0x101), vec![0]);
    sender.stop().await;
}

#[tokio::test]
async fn test_connection_failure_is_reported_once() {
    let (sender, mut events) = TsSender::new(config()).unwrap();
    let transport = MemoryTransport {
        fail_after: Some(2),
        ..Default::default()
    };
    let writes = transport.writes.clone();
    sender.start(transport).unwrap();

    for i in 0..6u64 {
        sender
            .send_audio_frame(&[0x21; 64], Duration::from_millis(i * 23))
            .unwrap();
    }

    let event = timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
    assert!(matches!(event, SenderEvent::ConnectionFailed(ref reason) if reason.contains("connection reset")));
    sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(writes.lock().len(), 2);

    // no retries; later frames just queue
    sender.send_audio_frame(&[0x21; 64], Duration::from_secs(1)).unwrap();
    assert!(sender.get_items_in_cache() > 0);
    sender.stop().await;
    assert_eq!(sender.get_items_in_cache(), 0);
}

#[tokio::test]
async fn test_stats_reported_every_second() {
    let (sender, mut events) = TsSender::new(config()).unwrap();
    sender.start(MemoryTransport::default()).unwrap();
    sender.send_audio_frame(&[0x21; 100], Duration::ZERO).unwrap();

    let event = timeout(Duration::from_secs(3), events.recv()).await.unwrap().unwrap();
    match event {
        SenderEvent::StreamingStats(stats) => {
            // three table packets and one audio packet
            assert_eq!(stats.bytes_sent, 4 * TS_PACKET_SIZE as u64);
            assert!(stats.bitrate > 0);
            assert_eq!(stats.bytes_queued, 0);
            assert_eq!(stats.throughput, Throughput::Unknown);
        }
        other => panic!("unexpected event {:?}", other),
    }
    sender.stop().await;
}

#[tokio::test]
async fn test_shared_across_tasks() {
    let (sender, _events) = TsSender::new(config()).unwrap();
    let sender = Arc::new(sender);
    let transport = MemoryTransport::default();
    let writes = transport.writes.clone();
    sender.start(transport).unwrap();

    let video = {
        let sender = sender.clone();
        tokio::spawn(async move {
            for i in 0..20u64 {
                sender
                    .send_video_frame(&[0, 0, 0, 1, 0x41, i as u8], Duration::from_millis(i * 33), false)
                    .unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    let audio = {
        let sender = sender.clone();
        tokio::spawn(async move {
            for i in 0..20u64 {
                sender.send_audio_frame(&[0x21, i as u8], Duration::from_millis(i * 23)).unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    video.await.unwrap();
    audio.await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while sender.get_sent_video_frames() + sender.get_sent_audio_frames() < 40 {
        assert!(Instant::now() < deadline);
        sleep(Duration::from_millis(5)).await;
    }

    // every PID keeps an unbroken counter
    let mut last: std::collections::HashMap<u16, u8> = Default::default();
    for write in writes.lock().iter() {
        for header in headers(write) {
            if let Some(prev) = last.insert(header.pid, header.continuity_counter) {
                if header.pid == 0x100 || header.pid == 0x101 {
                    assert_eq!(header.continuity_counter, (prev + 1) & 0x0f);
                }
            }
        }
    }
    sender.stop().await;
}
