// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::dmx::store::ChannelStore;
use crate::fixture::Device;

/// The UDP port Art-Net devices listen on.
pub const ARTNET_PORT: u16 = 6454;

/// The 8-byte packet identifier, including the terminating NUL.
const ARTNET_ID: &[u8; 8] = b"Art-Net\0";

/// The ArtDmx opcode, transmitted little-endian.
const OPCODE_DMX: u16 = 0x5000;

/// The Art-Net protocol revision, transmitted big-endian.
const PROTOCOL_VERSION: u16 = 14;

/// Builds an ArtDmx packet: 18-byte header followed by the channel payload,
/// padded to an even length as the protocol requires.
pub fn build_dmx_packet(sequence: u8, universe: u8, channels: &[u8]) -> Vec<u8> {
    let length = channels.len() + channels.len() % 2;
    let mut packet = Vec::with_capacity(18 + length);
    packet.extend_from_slice(ARTNET_ID);
    packet.extend_from_slice(&OPCODE_DMX.to_le_bytes());
    packet.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    packet.push(sequence);
    packet.push(0); // Physical input port, unused.
    packet.extend_from_slice(&u16::from(universe).to_le_bytes());
    packet.extend_from_slice(&(length as u16).to_be_bytes());
    packet.extend_from_slice(channels);
    packet.resize(18 + length, 0);
    packet
}

/// Transmits the channel store to fixtures over Art-Net at a fixed rate.
///
/// Each tick reads a point-in-time snapshot per universe and sends one packet
/// per device whose channel slice changed since the last transmission to that
/// device. Unchanged devices are skipped entirely (whole-slice compare), which
/// is where the bulk of the traffic reduction comes from.
pub struct Transmitter {
    socket: UdpSocket,
    store: Arc<ChannelStore>,
    devices: Arc<RwLock<HashMap<String, Device>>>,
    /// The last slice sent per device id. A failed send leaves the entry
    /// untouched so the device is retried on the next tick.
    last_sent: HashMap<String, Vec<u8>>,
    /// Per-device ArtDmx sequence numbers, wrapping within 1-255. Zero would
    /// disable sequence tracking on the receiver, so it is never used.
    sequences: HashMap<String, u8>,
    port: u16,
}

impl Transmitter {
    pub async fn new(
        store: Arc<ChannelStore>,
        devices: Arc<RwLock<HashMap<String, Device>>>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            store,
            devices,
            last_sent: HashMap::new(),
            sequences: HashMap::new(),
            port: ARTNET_PORT,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn next_sequence(&mut self, device_id: &str) -> u8 {
        let sequence = self.sequences.entry(device_id.to_string()).or_insert(0);
        *sequence = if *sequence >= 255 { 1 } else { *sequence + 1 };
        *sequence
    }

    /// Sends packets for every device with changed channels. Returns the
    /// number of packets sent. Send failures are logged and retried on the
    /// next tick without affecting other devices.
    pub async fn tick(&mut self) -> usize {
        let devices: Vec<Device> = self.devices.read().values().cloned().collect();
        let mut sent = 0;

        for device in devices {
            let slice = self.store.device_values(&device);
            if self.last_sent.get(&device.id) == Some(&slice) {
                continue;
            }

            let snapshot = self.store.snapshot(device.universe);
            let sequence = self.next_sequence(&device.id);
            let packet = build_dmx_packet(sequence, device.universe, &snapshot);
            match self.socket.send_to(&packet, (device.ip, self.port)).await {
                Ok(_) => {
                    self.last_sent.insert(device.id.clone(), slice);
                    sent += 1;
                }
                Err(err) => {
                    error!(
                        device = device.id,
                        ip = %device.ip,
                        err = err.to_string(),
                        "Error sending Art-Net packet"
                    );
                }
            }
        }

        sent
    }

    /// Runs the transmit loop at the given rate until cancelled.
    pub async fn run(mut self, rate_hz: f64, mut cancel: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / rate_hz));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.changed() => {
                    debug!("Art-Net transmitter stopped.");
                    return;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dmx::store::UNIVERSE_SIZE;
    use crate::fixture::test::rgbw_device;

    #[test]
    fn test_packet_layout() {
        let mut channels = [0u8; UNIVERSE_SIZE];
        channels[0] = 255;
        channels[3] = 42;
        let packet = build_dmx_packet(7, 3, &channels);

        assert_eq!(packet.len(), 18 + 512);
        assert_eq!(&packet[0..8], b"Art-Net\0");
        // OpDmx 0x5000 little-endian.
        assert_eq!(&packet[8..10], &[0x00, 0x50]);
        // Protocol version 14 big-endian.
        assert_eq!(&packet[10..12], &[0x00, 14]);
        assert_eq!(packet[12], 7); // Sequence
        assert_eq!(packet[13], 0); // Physical
        assert_eq!(&packet[14..16], &[3, 0]); // SubUni/Net little-endian
        assert_eq!(&packet[16..18], &[0x02, 0x00]); // Length 512 big-endian
        assert_eq!(packet[18], 255);
        assert_eq!(packet[21], 42);
    }

    #[test]
    fn test_packet_payload_padded_to_even_length() {
        let packet = build_dmx_packet(1, 0, &[10, 20, 30]);
        assert_eq!(&packet[16..18], &[0, 4]);
        assert_eq!(&packet[18..], &[10, 20, 30, 0]);
    }

    async fn test_transmitter() -> (Transmitter, Arc<ChannelStore>, UdpSocket) {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let store = Arc::new(ChannelStore::new());
        let devices = Arc::new(RwLock::new(HashMap::new()));
        devices
            .write()
            .insert("par".to_string(), rgbw_device("par", 0, 1));

        let transmitter = Transmitter::new(store.clone(), devices)
            .await
            .unwrap()
            .with_port(port);
        (transmitter, store, receiver)
    }

    #[tokio::test]
    async fn test_delta_cache_skips_unchanged_devices() {
        let (mut transmitter, store, _receiver) = test_transmitter().await;

        store.write_device(&rgbw_device("par", 0, 1), &[1, 2, 3, 4]);
        assert_eq!(transmitter.tick().await, 1);
        // Identical slice: no packet.
        assert_eq!(transmitter.tick().await, 0);
        assert_eq!(transmitter.tick().await, 0);

        // A change triggers exactly one more packet.
        store.write(0, 0, 9);
        assert_eq!(transmitter.tick().await, 1);
        assert_eq!(transmitter.tick().await, 0);
    }

    #[tokio::test]
    async fn test_transmitted_packet_contents() {
        let (mut transmitter, store, receiver) = test_transmitter().await;

        store.write_device(&rgbw_device("par", 0, 1), &[11, 22, 33, 44]);
        assert_eq!(transmitter.tick().await, 1);

        let mut buf = [0u8; 1024];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, 18 + 512);
        assert_eq!(&buf[0..8], b"Art-Net\0");
        assert_eq!(buf[12], 1); // First sequence number is 1, never 0.
        assert_eq!(&buf[18..22], &[11, 22, 33, 44]);
    }

    #[tokio::test]
    async fn test_sequence_numbers_wrap_past_255() {
        let (mut transmitter, _store, _receiver) = test_transmitter().await;

        for expected in 1..=255u8 {
            assert_eq!(transmitter.next_sequence("par"), expected);
        }
        // 255 wraps back to 1, skipping 0.
        assert_eq!(transmitter.next_sequence("par"), 1);
    }
}
