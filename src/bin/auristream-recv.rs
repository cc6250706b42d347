//! Demo receiver binary: listens on a source and a repair UDP port,
//! drives a `ReceiverSession`, and plays the resulting frames out the
//! default speaker, standing in for a full CLI. UDP I/O runs directly
//! on the `tokio` runtime as a dedicated async task per socket; speaker
//! playback is blocking cpal work bridged to its own thread, matching
//! the sender binary's capture-thread bridge.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use auristream::audio_io::SpeakerSink;
use auristream::config::SessionConfig;
use auristream::sample_spec::{ChannelLayout, Frame, SampleFormat, SampleSpec};
use auristream::session::ReceiverSession;

fn parse_args() -> Result<(u16, u16)> {
    let mut args = std::env::args().skip(1);
    let source_port: u16 = args.next().unwrap_or_else(|| "7000".to_string()).parse().context("source port")?;
    let repair_port: u16 = args.next().unwrap_or_else(|| "7001".to_string()).parse().context("repair port")?;
    Ok((source_port, repair_port))
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder().with_max_level(Level::INFO).with_target(true).with_thread_ids(true).init();

    info!("auristream-recv v{}", env!("CARGO_PKG_VERSION"));

    let config = SessionConfig::load()?;
    let (source_port, repair_port) = parse_args()?;
    info!(source_port, repair_port, "listening for peer");

    let spec = SampleSpec::new(44_100, ChannelLayout::Stereo, SampleFormat::S16Be);
    let samples_per_packet = spec.ns_2_samples_per_chan(Duration::from_nanos(config.packet_length_ns)).max(1) as usize;

    let source_socket =
        UdpSocket::bind(("0.0.0.0", source_port)).await.context("binding source socket")?;
    let repair_socket =
        UdpSocket::bind(("0.0.0.0", repair_port)).await.context("binding repair socket")?;

    let start = Instant::now();
    let mut session = ReceiverSession::new(&config, spec, start);

    // Bounded: the speaker thread applies backpressure to frame
    // production rather than letting frames pile up unboundedly.
    let (frame_tx, frame_rx) = mpsc::channel::<Frame>(8);
    std::thread::spawn(move || {
        let mut frame_rx = frame_rx;
        let speaker = match SpeakerSink::open(spec) {
            Ok(speaker) => speaker,
            Err(err) => {
                warn!(%err, "auristream-recv: failed to open speaker");
                return;
            }
        };
        while let Some(frame) = frame_rx.blocking_recv() {
            if let Err(err) = speaker.write(&frame) {
                warn!(%err, "auristream-recv: speaker write failed, stopping playback");
                return;
            }
        }
    });

    let packet_period = Duration::from_nanos(config.packet_length_ns);
    let mut playback_ticks = tokio::time::interval(packet_period.max(Duration::from_millis(1)));
    let mut source_buf = vec![0u8; 2048];
    let mut repair_buf = vec![0u8; 2048];

    loop {
        if let Err(err) = session.refresh() {
            warn!(%err, "receiver session terminated, shutting down");
            break;
        }

        tokio::select! {
            result = source_socket.recv_from(&mut source_buf) => {
                match result {
                    Ok((len, _addr)) => {
                        let wire = Bytes::copy_from_slice(&source_buf[..len]);
                        if let Err(err) = session.push_source(wire, Instant::now()) {
                            warn!(%err, "receiver session terminated while ingesting source packet");
                            break;
                        }
                    }
                    Err(err) => warn!(%err, "auristream-recv: source socket recv failed"),
                }
            }
            result = repair_socket.recv_from(&mut repair_buf) => {
                match result {
                    Ok((len, _addr)) => {
                        let wire = Bytes::copy_from_slice(&repair_buf[..len]);
                        if let Err(err) = session.push_repair(wire, Instant::now()) {
                            warn!(%err, "receiver session terminated while ingesting repair packet");
                            break;
                        }
                    }
                    Err(err) => warn!(%err, "auristream-recv: repair socket recv failed"),
                }
            }
            _ = playback_ticks.tick() => {
                let frame = session.read_frame(samples_per_packet, Instant::now());
                if frame_tx.send(frame).await.is_err() {
                    info!("auristream-recv: speaker thread stopped, shutting down");
                    break;
                }
            }
        }
    }

    info!(
        dropped = session.metrics.dropped_packets,
        repaired = session.metrics.repaired_packets,
        lost_after_fec = session.metrics.lost_after_fec,
        "receiver session metrics"
    );
    Ok(())
}
