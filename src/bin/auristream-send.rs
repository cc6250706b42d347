//! Demo sender binary: captures from the default microphone and sends
//! RTP/FEC packets over two UDP sockets (source + repair ports) to a
//! peer address, standing in for a full CLI. The blocking microphone
//! capture runs on its own thread (per `audio_io`'s contract); a
//! `tokio` task bridges its frames to the session and ticks the
//! periodic RTCP sender report, using a dedicated I/O thread feeding a
//! bounded async queue.

use std::net::UdpSocket;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use auristream::audio_io::MicrophoneSource;
use auristream::config::SessionConfig;
use auristream::packet::rtp::PT_L16_STEREO;
use auristream::packet::{Packet, PacketFlags};
use auristream::router::{FrameWriter, OutboundRouter, PacketSink};
use auristream::sample_spec::{ChannelLayout, Frame, SampleFormat, SampleSpec};
use auristream::session::SenderSession;

struct UdpPacketSink {
    socket: UdpSocket,
}

impl PacketSink for UdpPacketSink {
    fn write(&self, packet: Packet) -> auristream::error::Result<()> {
        let wire = packet.wire_bytes().cloned().unwrap_or_default();
        if let Err(err) = self.socket.send(&wire) {
            warn!(%err, "auristream-send: dropping packet after udp send failure");
        }
        Ok(())
    }
}

fn parse_args() -> Result<(String, u16, u16)> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let source_port: u16 = args.next().unwrap_or_else(|| "7000".to_string()).parse().context("source port")?;
    let repair_port: u16 = args.next().unwrap_or_else(|| "7001".to_string()).parse().context("repair port")?;
    Ok((host, source_port, repair_port))
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder().with_max_level(Level::INFO).with_target(true).with_thread_ids(true).init();

    info!("auristream-send v{}", env!("CARGO_PKG_VERSION"));

    let config = SessionConfig::load()?;
    let (host, source_port, repair_port) = parse_args()?;
    info!(%host, source_port, repair_port, "sending to peer");

    let spec = SampleSpec::new(44_100, ChannelLayout::Stereo, SampleFormat::S16Be);
    let samples_per_packet = spec.ns_2_samples_per_chan(Duration::from_nanos(config.packet_length_ns)).max(1) as usize;

    let source_socket = UdpSocket::bind("0.0.0.0:0").context("binding source socket")?;
    source_socket.connect((host.as_str(), source_port)).context("connecting source socket")?;
    let repair_socket = UdpSocket::bind("0.0.0.0:0").context("binding repair socket")?;
    repair_socket.connect((host.as_str(), repair_port)).context("connecting repair socket")?;

    let mut router = OutboundRouter::new();
    router.add_route(PacketFlags::REPAIR, Box::new(UdpPacketSink { socket: repair_socket }));
    router.add_route(PacketFlags::AUDIO, Box::new(UdpPacketSink { socket: source_socket }));

    let interleaver_seed = rand::random::<u64>();
    let mut session = SenderSession::new(spec, PT_L16_STEREO, samples_per_packet, config.fec, interleaver_seed, router)
        .context("constructing sender session")?;
    info!(ssrc = session.ssrc(), cname = session.cname(), "sender session started");

    // Bounded: the capture thread blocks once the session falls behind,
    // rather than growing memory unboundedly.
    let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(8);
    std::thread::spawn(move || {
        let mut mic = match MicrophoneSource::open(spec, samples_per_packet) {
            Ok(mic) => mic,
            Err(err) => {
                warn!(%err, "auristream-send: failed to open microphone");
                return;
            }
        };
        loop {
            match mic.read() {
                Ok(frame) => {
                    if frame_tx.blocking_send(frame).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!(%err, "auristream-send: microphone read failed, stopping capture");
                    return;
                }
            }
        }
    });

    let mut report_ticks = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else {
                    info!("auristream-send: capture thread stopped, shutting down");
                    break;
                };
                if let Err(err) = session.write_frame(&frame) {
                    warn!(%err, "sender session terminated");
                    break;
                }
            }
            _ = report_ticks.tick() => {
                let now_ns = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos() as i64)
                    .unwrap_or(0);
                let report = session.query_send_stream(now_ns);
                info!(packets = report.packet_count, octets = report.octet_count, "sender report");
            }
        }
    }

    session.flush().ok();
    Ok(())
}
