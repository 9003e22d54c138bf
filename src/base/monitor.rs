use crate::base::error::{Error, Result};
use crate::base::frame::Frame;
use crate::base::ring_byte_buffer::RingByteBuffer;
use crate::cmds::{
    SICK_PLS_MSG_HEADER_LEN, SICK_PLS_MSG_MAX_LEN, SICK_PLS_MSG_PAYLOAD_MAX_LEN,
    SICK_PLS_MSG_TRAILER_LEN, SICK_PLS_POLL_INTERVAL, SICK_PLS_STX,
};
use log::{trace, warn};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Capacity of the monitor's byte queue. Holds several maximum-size frames
/// so a burst of streamed scans cannot stall the scanner.
const MONITOR_BUFFER_CAPACITY: usize = 4 * SICK_PLS_MSG_MAX_LEN;

/// Single-slot mailbox holding the most recent well-formed frame.
///
/// The protocol is strictly request/response, and streamed frames older than
/// the freshest are uninteresting, so each new frame overwrites the slot.
/// Freshness is slot occupancy: `take` consumes the frame, and a later
/// publish refills the slot.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<Frame>>,
}

impl Mailbox {
    fn publish(&self, frame: Frame) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            trace!("mailbox overwriting unconsumed frame");
        }
        *slot = Some(frame);
    }

    /// Removes and returns the freshest frame, if one is pending.
    pub fn take(&self) -> Option<Frame> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Marks any pending frame as consumed.
    pub fn flush(&self) {
        let _ = self.take();
    }
}

/// Background reader that drains the serial port and publishes frames.
///
/// One dedicated thread pulls bytes from the read side of the serial device
/// into a ring buffer, resynchronizes on frame boundaries, and publishes
/// every CRC-clean frame into the [`Mailbox`]. Runs from `initialize` until
/// `uninitialize`.
#[derive(Debug)]
pub struct BufferMonitor {
    mailbox: Arc<Mailbox>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BufferMonitor {
    /// Spawns the monitor thread over the given byte stream.
    ///
    /// The stream must implement the non-blocking read discipline: a read
    /// with nothing available returns zero bytes (or times out) rather than
    /// blocking.
    pub fn start<R>(stream: R) -> Result<BufferMonitor>
    where
        R: Read + Send + 'static,
    {
        let mailbox = Arc::new(Mailbox::default());
        let running = Arc::new(AtomicBool::new(true));

        let thread_mailbox = Arc::clone(&mailbox);
        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("sick-pls-monitor".to_owned())
            .spawn(move || monitor_loop(stream, thread_mailbox, thread_running))
            .map_err(|err| Error::Thread {
                description: format!("failed to start buffer monitor: {}", err),
            })?;

        trace!("buffer monitor started");
        Ok(BufferMonitor {
            mailbox,
            running,
            handle: Some(handle),
        })
    }

    /// The mailbox the monitor publishes into.
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Signals the monitor thread to stop and joins it.
    ///
    /// The thread exits at its next iteration boundary. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| Error::Thread {
                description: "buffer monitor thread panicked".to_owned(),
            })?;
            trace!("buffer monitor stopped");
        }
        Ok(())
    }
}

impl Drop for BufferMonitor {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("error stopping buffer monitor during drop: {}", err);
        }
    }
}

fn monitor_loop<R: Read>(mut stream: R, mailbox: Arc<Mailbox>, running: Arc<AtomicBool>) {
    let mut queue = RingByteBuffer::with_capacity(MONITOR_BUFFER_CAPACITY);

    while running.load(Ordering::Relaxed) {
        match queue.read_from(&mut stream) {
            Ok(0) => {}
            Ok(read) => trace!("monitor drained {} bytes from serial", read),
            Err(err) => {
                // Transient faults (e.g. an interrupted syscall) are retried;
                // the thread only exits through the run flag.
                warn!("monitor read error: {}", err);
            }
        }

        scan_frames(&mut queue, &mut |frame| mailbox.publish(frame));

        thread::sleep(SICK_PLS_POLL_INTERVAL);
    }
}

/// Scans the byte queue for complete frames and hands each one to `publish`.
///
/// Resynchronization: hunt for STX, reject candidates whose length word
/// exceeds the payload bound (an STX embedded in data), and on CRC failure
/// advance a single byte past the suspect STX. Advancing one byte on every
/// rejection guarantees forward progress through garbage.
fn scan_frames(queue: &mut RingByteBuffer, publish: &mut impl FnMut(Frame)) {
    loop {
        // Hunt for the start of a frame.
        while let Some(byte) = queue.peek(0) {
            if byte == SICK_PLS_STX {
                break;
            }
            queue.skip_bytes(1);
        }

        if queue.len() < SICK_PLS_MSG_HEADER_LEN {
            return;
        }

        // peek() is in range: the header length check above guarantees it.
        let payload_length =
            usize::from(queue.peek(2).unwrap()) | usize::from(queue.peek(3).unwrap()) << 8;
        if payload_length == 0 || payload_length > SICK_PLS_MSG_PAYLOAD_MAX_LEN {
            trace!("spurious STX: implausible length {}", payload_length);
            queue.skip_bytes(1);
            continue;
        }

        let frame_length = SICK_PLS_MSG_HEADER_LEN + payload_length + SICK_PLS_MSG_TRAILER_LEN;
        if queue.len() < frame_length {
            return;
        }

        let mut raw = [0u8; SICK_PLS_MSG_MAX_LEN];
        queue.copy_into(0, &mut raw[..frame_length]);

        match Frame::parse(&raw[..frame_length]) {
            Ok(frame) => {
                trace!(
                    "monitor decoded frame: dest={:02X}, code={:02X}, len={}",
                    frame.dest_address(),
                    frame.command_code(),
                    frame.payload().len()
                );
                publish(frame);
                queue.skip_bytes(frame_length);
            }
            Err(err) => {
                warn!("dropping frame candidate: {}", err);
                queue.skip_bytes(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmds::SICK_PLS_HOST_ADDRESS;
    use std::io::Write;
    use std::time::{Duration, Instant};

    fn frame_bytes(payload: &[u8]) -> Vec<u8> {
        Frame::build(SICK_PLS_HOST_ADDRESS, payload)
            .unwrap()
            .to_bytes()
    }

    fn collect_frames(stream: &[u8]) -> Vec<Frame> {
        let mut queue = RingByteBuffer::with_capacity(MONITOR_BUFFER_CAPACITY);
        queue.write_all(stream).unwrap();
        let mut frames = Vec::new();
        scan_frames(&mut queue, &mut |frame| frames.push(frame));
        frames
    }

    #[test]
    fn scanner_finds_frames_between_garbage() {
        let mut stream = vec![0xDE, 0xAD, 0xFF, 0xFF];
        stream.extend_from_slice(&frame_bytes(&[0x90, 0x01, 0x00]));
        stream.extend_from_slice(&[0xFF; 7]);
        stream.extend_from_slice(&frame_bytes(&[0xB0, 0x02, 0x00, 0x64, 0x00, 0x64, 0x00]));

        let frames = collect_frames(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command_code(), 0x90);
        assert_eq!(frames[1].command_code(), 0xB0);
    }

    #[test]
    fn scanner_drops_corrupt_frame_and_recovers() {
        // Single-byte payload so the corrupted remains hold no byte that
        // could pass for a second STX while the scanner recovers.
        let good = frame_bytes(&[0x90]);
        let mut corrupt = good.clone();
        corrupt[4] ^= 0x01; // payload byte no longer matches the trailer

        let mut stream = good.clone();
        stream.extend_from_slice(&corrupt);
        stream.extend_from_slice(&good);

        let frames = collect_frames(&stream);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.command_code() == 0x90));
    }

    #[test]
    fn embedded_stx_does_not_cause_false_resync() {
        // A payload byte of 0x02 followed by a huge bogus length word must
        // not derail the scanner once the enclosing frame is complete.
        let inner = frame_bytes(&[0x31, 0x02, 0xFF, 0x7F, 0x11]);
        let mut stream = vec![0x02]; // lone STX with nothing plausible behind it
        stream.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        stream.extend_from_slice(&inner);

        let frames = collect_frames(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), &[0x31, 0x02, 0xFF, 0x7F, 0x11]);
    }

    #[test]
    fn scanner_waits_for_more_data_on_partial_frame() {
        let full = frame_bytes(&[0xB0, 0x01, 0x00, 0x64, 0x00]);
        let (first, rest) = full.split_at(4);

        let mut queue = RingByteBuffer::with_capacity(MONITOR_BUFFER_CAPACITY);
        let mut frames = Vec::new();
        queue.write_all(first).unwrap();
        scan_frames(&mut queue, &mut |frame| frames.push(frame));
        assert!(frames.is_empty());
        assert_eq!(queue.len(), first.len());

        queue.write_all(rest).unwrap();
        scan_frames(&mut queue, &mut |frame| frames.push(frame));
        assert_eq!(frames.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn mailbox_keeps_latest_frame_only() {
        let mailbox = Mailbox::default();
        mailbox.publish(Frame::build(SICK_PLS_HOST_ADDRESS, &[0x90, 0x00]).unwrap());
        mailbox.publish(Frame::build(SICK_PLS_HOST_ADDRESS, &[0xB0, 0x00]).unwrap());

        let frame = mailbox.take().unwrap();
        assert_eq!(frame.command_code(), 0xB0);
        assert!(mailbox.take().is_none());

        mailbox.publish(Frame::build(SICK_PLS_HOST_ADDRESS, &[0x90, 0x00]).unwrap());
        mailbox.flush();
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn monitor_thread_publishes_and_stops() {
        let mut stream = vec![0x00, 0x01];
        stream.extend_from_slice(&frame_bytes(&[0x90, 0x00, 0x00]));

        let mut monitor = BufferMonitor::start(std::io::Cursor::new(stream)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let frame = loop {
            if let Some(frame) = monitor.mailbox().take() {
                break frame;
            }
            assert!(Instant::now() < deadline, "monitor never published");
            thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(frame.command_code(), 0x90);

        monitor.stop().unwrap();
        // Second stop is a no-op.
        monitor.stop().unwrap();
    }
}
