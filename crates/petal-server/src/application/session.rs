//! Session handler: one connection from length prefix to closed socket.
//!
//! # State machine (for beginners)
//!
//! ```text
//! AwaitingLength ──► ReceivingPayload ──► Classifying ──► SendingResult ──► Closed
//! ```
//!
//! Each state either advances to the next one or fails, and every failure
//! lands in `Closed` as well.  The session never loops back: one request,
//! one response, one close.
//!
//! | State              | Does                                   | Fails with        |
//! |--------------------|----------------------------------------|-------------------|
//! | `AwaitingLength`   | read exactly 8 bytes                   | `Protocol`, `ConnectionLost` |
//! | `ReceivingPayload` | read ≤ 1024-byte chunks until complete | `ConnectionLost`  |
//! | `Classifying`      | decode image, run inference            | `Decode`, `Inference` |
//! | `SendingResult`    | write the UTF-8 result line            | `ConnectionLost`  |
//!
//! The stream is abstracted as [`SessionStream`] so these rules can be tested
//! without a socket.

use std::io::{self, Read, Write};

use petal_core::{check_declared_length, decode_length_prefix, CHUNK_SIZE, LENGTH_PREFIX_SIZE};
use tracing::{debug, info, trace};

use crate::application::inference::InferenceAdapter;
use crate::domain::connection::{ConnectionInfo, SessionState};
use crate::domain::error::SessionError;
use crate::domain::payload::ImagePayload;
use crate::domain::result::{ClassificationResult, DEFAULT_RESPONSE_PREFIX};

/// A bidirectional byte stream that can also be shut down.
///
/// `close` takes `&self` and must be idempotent: it is called once by the
/// session itself and possibly again, concurrently, by the shutdown path.
pub trait SessionStream: Read + Write {
    fn close(&self) -> io::Result<()>;

    /// `true` once the server has shut the stream down from outside the
    /// session.  An EOF seen after that is a lost connection, not a short
    /// request.
    fn force_closed(&self) -> bool;
}

/// Per-server knobs every session reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Largest declared payload accepted; `None` means unlimited.
    pub max_payload_bytes: Option<u64>,
    /// Text placed before the label pair in the response line.
    pub response_prefix: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_payload_bytes: None,
            response_prefix: DEFAULT_RESPONSE_PREFIX.to_string(),
        }
    }
}

/// Drives one accepted connection through the state machine.
pub struct Session<S: SessionStream> {
    info: ConnectionInfo,
    stream: S,
    state: SessionState,
}

impl<S: SessionStream> Session<S> {
    pub fn new(info: ConnectionInfo, stream: S) -> Self {
        Self {
            info,
            stream,
            state: SessionState::AwaitingLength,
        }
    }

    /// Serves the request and closes the stream, whatever the outcome.
    ///
    /// Returns the delivered result, or the error that ended the session.
    pub fn run(
        mut self,
        adapter: &InferenceAdapter,
        settings: &SessionSettings,
    ) -> Result<ClassificationResult, SessionError> {
        let outcome = self.drive(adapter, settings);
        self.close();
        outcome
    }

    fn drive(
        &mut self,
        adapter: &InferenceAdapter,
        settings: &SessionSettings,
    ) -> Result<ClassificationResult, SessionError> {
        let declared = self.read_length(settings.max_payload_bytes)?;
        debug!(session = %self.info.id, declared, "length prefix received");

        self.transition(SessionState::ReceivingPayload);
        let payload = self.read_payload(declared)?;

        self.transition(SessionState::Classifying);
        // read_payload only returns once the declared size is reached
        let bytes = payload.complete_bytes().unwrap_or_default();
        let image = image::load_from_memory(bytes)?;
        info!(
            session = %self.info.id,
            width = image.width(),
            height = image.height(),
            "image loaded"
        );
        let result = adapter.predict(&image)?;
        info!(session = %self.info.id, index = result.index, "prediction complete");

        self.transition(SessionState::SendingResult);
        let line = result.response_line(&settings.response_prefix);
        self.write_result(&line)?;
        info!(session = %self.info.id, result = %line, "result sent");
        Ok(result)
    }

    fn transition(&mut self, next: SessionState) {
        trace!(session = %self.info.id, from = %self.state, to = %next, "state change");
        self.state = next;
    }

    fn connection_lost(&self, source: io::Error) -> SessionError {
        SessionError::ConnectionLost {
            stage: self.state,
            source,
        }
    }

    /// Reads the 8-byte prefix.  EOF before all 8 bytes is a protocol error,
    /// unless the server closed the stream itself.
    fn read_length(&mut self, limit: Option<u64>) -> Result<u64, SessionError> {
        let mut header = [0u8; LENGTH_PREFIX_SIZE];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_SIZE {
            match self.stream.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.connection_lost(e)),
            }
        }
        if filled < LENGTH_PREFIX_SIZE && self.stream.force_closed() {
            return Err(self.connection_lost(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server shutdown",
            )));
        }
        let declared = decode_length_prefix(&header[..filled])?;
        Ok(check_declared_length(declared, limit)?)
    }

    fn read_payload(&mut self, declared: u64) -> Result<ImagePayload, SessionError> {
        let mut payload = ImagePayload::new(declared);
        let mut chunk = [0u8; CHUNK_SIZE];
        while !payload.is_complete() {
            let want = payload.remaining().min(CHUNK_SIZE as u64) as usize;
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => {
                    return Err(SessionError::peer_closed(
                        self.state,
                        payload.received(),
                        declared,
                    ))
                }
                Ok(n) => {
                    payload.extend(&chunk[..n]);
                    trace!(
                        session = %self.info.id,
                        received = payload.received(),
                        declared,
                        "payload chunk"
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.connection_lost(e)),
            }
        }
        Ok(payload)
    }

    fn write_result(&mut self, line: &str) -> Result<(), SessionError> {
        let written = self
            .stream
            .write_all(line.as_bytes())
            .and_then(|()| self.stream.flush());
        written.map_err(|e| self.connection_lost(e))
    }

    fn close(&mut self) {
        if let Err(e) = self.stream.close() {
            debug!(session = %self.info.id, error = %e, "close failed");
        }
        self.transition(SessionState::Closed);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::inference::MockClassifier;
    use crate::domain::error::{InferenceError, SessionErrorKind};
    use crate::domain::labels::{LabelEntry, LabelTable};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use petal_core::{encode_frame, encode_length, ProtocolError};
    use std::cell::{Cell, RefCell};
    use std::io::Cursor;
    use std::rc::Rc;

    /// In-memory stream: scripted input, captured output, counted closes.
    struct FakeStream {
        input: Cursor<Vec<u8>>,
        output: Rc<RefCell<Vec<u8>>>,
        closes: Rc<Cell<usize>>,
        largest_read: Rc<Cell<usize>>,
        fail_reads: bool,
        fail_writes: bool,
        forced: bool,
    }

    struct Probe {
        output: Rc<RefCell<Vec<u8>>>,
        closes: Rc<Cell<usize>>,
        largest_read: Rc<Cell<usize>>,
    }

    impl FakeStream {
        fn new(input: Vec<u8>) -> (Self, Probe) {
            let probe = Probe {
                output: Rc::default(),
                closes: Rc::default(),
                largest_read: Rc::default(),
            };
            let stream = Self {
                input: Cursor::new(input),
                output: Rc::clone(&probe.output),
                closes: Rc::clone(&probe.closes),
                largest_read: Rc::clone(&probe.largest_read),
                fail_reads: false,
                fail_writes: false,
                forced: false,
            };
            (stream, probe)
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.fail_reads {
                return Err(io::Error::from(io::ErrorKind::ConnectionReset));
            }
            self.largest_read.set(self.largest_read.get().max(buf.len()));
            self.input.read(buf)
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.output.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SessionStream for FakeStream {
        fn close(&self) -> io::Result<()> {
            self.closes.set(self.closes.get() + 1);
            Ok(())
        }

        fn force_closed(&self) -> bool {
            self.forced
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 10, 40])));
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    /// PNG of pseudo-random pixels, large enough to span many chunks.
    fn noisy_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut seed: u32 = 0x1234_5678;
        let image = RgbImage::from_fn(width, height, |_, _| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let [r, g, b, _] = seed.to_le_bytes();
            Rgb([r, g, b])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn rose_adapter() -> InferenceAdapter {
        let mut mock = MockClassifier::new();
        mock.expect_class_count().return_const(2usize);
        mock.expect_input_size().return_const((8u32, 8u32));
        mock.expect_classify().returning(|_| Ok(vec![0.2, 0.9]));
        let labels = LabelTable::new(vec![
            LabelEntry::new("daisy", "데이지"),
            LabelEntry::new("rose", "장미"),
        ])
        .unwrap();
        InferenceAdapter::new(Box::new(mock), labels).unwrap()
    }

    fn session(stream: FakeStream) -> Session<FakeStream> {
        Session::new(
            ConnectionInfo::new("127.0.0.1:50000".parse().unwrap()),
            stream,
        )
    }

    #[test]
    fn test_run_delivers_result_line_and_closes() {
        // Arrange
        let (stream, probe) = FakeStream::new(encode_frame(&png_bytes(40, 30)));

        // Act
        let result = session(stream)
            .run(&rose_adapter(), &SessionSettings::default())
            .unwrap();

        // Assert
        assert_eq!(result.index, 1);
        let sent = String::from_utf8(probe.output.borrow().clone()).unwrap();
        assert_eq!(sent, "Flower classification : 장미(rose)");
        assert_eq!(probe.closes.get(), 1);
    }

    #[test]
    fn test_payload_reads_never_exceed_chunk_size() {
        // Arrange – a payload well over one chunk
        let payload = noisy_png_bytes(64, 64);
        assert!(payload.len() > CHUNK_SIZE);
        let (stream, probe) = FakeStream::new(encode_frame(&payload));

        // Act
        session(stream)
            .run(&rose_adapter(), &SessionSettings::default())
            .unwrap();

        // Assert
        assert!(probe.largest_read.get() <= CHUNK_SIZE);
    }

    #[test]
    fn test_custom_prefix_is_used() {
        let (stream, probe) = FakeStream::new(encode_frame(&png_bytes(4, 4)));
        let settings = SessionSettings {
            response_prefix: "꽃 분류".to_string(),
            ..SessionSettings::default()
        };

        session(stream).run(&rose_adapter(), &settings).unwrap();

        assert_eq!(
            String::from_utf8(probe.output.borrow().clone()).unwrap(),
            "꽃 분류 : 장미(rose)"
        );
    }

    #[test]
    fn test_immediate_eof_is_protocol_error() {
        let (stream, probe) = FakeStream::new(Vec::new());

        let err = session(stream)
            .run(&rose_adapter(), &SessionSettings::default())
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::InsufficientData { available: 0, .. })
        ));
        assert_eq!(probe.closes.get(), 1);
        assert!(probe.output.borrow().is_empty());
    }

    #[test]
    fn test_short_header_is_protocol_error() {
        let (stream, _probe) = FakeStream::new(vec![0, 0, 0]);

        let err = session(stream)
            .run(&rose_adapter(), &SessionSettings::default())
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::InsufficientData { available: 3, .. })
        ));
    }

    #[test]
    fn test_eof_after_server_close_in_header_is_connection_lost() {
        // Arrange – the shutdown path closed the stream before any header byte
        let (mut stream, probe) = FakeStream::new(Vec::new());
        stream.forced = true;

        // Act
        let err = session(stream)
            .run(&rose_adapter(), &SessionSettings::default())
            .unwrap_err();

        // Assert
        assert!(matches!(
            err,
            SessionError::ConnectionLost {
                stage: SessionState::AwaitingLength,
                ..
            }
        ));
        assert_eq!(err.kind(), SessionErrorKind::ConnectionLost);
        assert_eq!(probe.closes.get(), 1);
    }

    #[test]
    fn test_read_error_in_header_is_connection_lost() {
        let (mut stream, _probe) = FakeStream::new(Vec::new());
        stream.fail_reads = true;

        let err = session(stream)
            .run(&rose_adapter(), &SessionSettings::default())
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::ConnectionLost {
                stage: SessionState::AwaitingLength,
                ..
            }
        ));
    }

    #[test]
    fn test_truncated_payload_is_connection_lost() {
        // Arrange – header promises 1000 bytes, only 10 arrive
        let mut input = encode_length(1000).to_vec();
        input.extend_from_slice(&[7u8; 10]);
        let (stream, probe) = FakeStream::new(input);

        // Act
        let err = session(stream)
            .run(&rose_adapter(), &SessionSettings::default())
            .unwrap_err();

        // Assert
        assert_eq!(err.kind(), SessionErrorKind::ConnectionLost);
        assert!(matches!(
            err,
            SessionError::ConnectionLost {
                stage: SessionState::ReceivingPayload,
                ..
            }
        ));
        assert_eq!(probe.closes.get(), 1);
    }

    #[test]
    fn test_zero_length_payload_is_decode_error() {
        let (stream, probe) = FakeStream::new(encode_length(0).to_vec());

        let err = session(stream)
            .run(&rose_adapter(), &SessionSettings::default())
            .unwrap_err();

        assert_eq!(err.kind(), SessionErrorKind::Decode);
        assert!(probe.output.borrow().is_empty());
    }

    #[test]
    fn test_garbage_payload_is_decode_error() {
        let (stream, _probe) = FakeStream::new(encode_frame(b"definitely not an image"));

        let err = session(stream)
            .run(&rose_adapter(), &SessionSettings::default())
            .unwrap_err();

        assert_eq!(err.kind(), SessionErrorKind::Decode);
    }

    #[test]
    fn test_declared_size_above_limit_is_rejected_before_payload() {
        // Arrange
        let (stream, probe) = FakeStream::new(encode_frame(&[0u8; 64]));
        let settings = SessionSettings {
            max_payload_bytes: Some(16),
            ..SessionSettings::default()
        };

        // Act
        let err = session(stream).run(&rose_adapter(), &settings).unwrap_err();

        // Assert – only the 8 header bytes were requested
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::PayloadTooLarge {
                declared: 64,
                limit: 16
            })
        ));
        assert_eq!(probe.largest_read.get(), LENGTH_PREFIX_SIZE);
    }

    #[test]
    fn test_inference_failure_is_reported_and_nothing_sent() {
        let mut mock = MockClassifier::new();
        mock.expect_class_count().return_const(1usize);
        mock.expect_input_size().return_const((8u32, 8u32));
        mock.expect_classify().returning(|_| Ok(vec![f32::NAN]));
        let labels = LabelTable::new(vec![LabelEntry::new("rose", "장미")]).unwrap();
        let adapter = InferenceAdapter::new(Box::new(mock), labels).unwrap();
        let (stream, probe) = FakeStream::new(encode_frame(&png_bytes(4, 4)));

        let err = session(stream)
            .run(&adapter, &SessionSettings::default())
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Inference(InferenceError::InvalidScore { index: 0 })
        ));
        assert!(probe.output.borrow().is_empty());
    }

    #[test]
    fn test_write_failure_is_connection_lost_while_sending() {
        let (mut stream, probe) = FakeStream::new(encode_frame(&png_bytes(4, 4)));
        stream.fail_writes = true;

        let err = session(stream)
            .run(&rose_adapter(), &SessionSettings::default())
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::ConnectionLost {
                stage: SessionState::SendingResult,
                ..
            }
        ));
        assert_eq!(probe.closes.get(), 1);
    }
}
