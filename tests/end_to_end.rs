use d5m_capture::d5m::controller::Mmio;
use d5m_capture::{
    AckMode, BufferHandle, Camera, Controller, Error, FrameHandoff, InterruptNotifier, PingPong,
    SensorOptions, TestPattern,
};
use embedded_hal_mock::delay::MockNoop;
use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
use embedded_hal_mock::MockError;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU32, Ordering};

const ADDR: u8 = 0x5D;

/// Controller block backed by plain atomics, with write-one-to-clear status.
struct Block {
    regs: [AtomicU32; 4],
}

impl Block {
    const fn new() -> Self {
        Block {
            regs: [
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
                AtomicU32::new(0),
            ],
        }
    }

    fn raise(&self) {
        self.regs[2].fetch_or(1, Ordering::SeqCst);
    }
}

impl Mmio for Block {
    fn read_word(&self, offset: usize) -> u32 {
        self.regs[offset].load(Ordering::SeqCst)
    }

    fn write_word(&self, offset: usize, value: u32) {
        if offset == 2 {
            self.regs[2].fetch_and(!value, Ordering::SeqCst);
        } else {
            self.regs[offset].store(value, Ordering::SeqCst);
        }
    }
}

static HANDOFF: FrameHandoff<Block> =
    FrameHandoff::new(Controller::new(Block::new(), AckMode::StatusRegister));

fn write(bytes: [u8; 3]) -> I2cTransaction {
    I2cTransaction::write(ADDR, bytes.to_vec())
}

fn bring_up_until_read_mode() -> Vec<I2cTransaction> {
    vec![
        write([0x03, 0x07, 0x7F]),
        write([0x04, 0x09, 0xFF]),
        write([0x09, 0x00, 0x03]),
        write([0x08, 0x00, 0x00]),
        write([0x22, 0x00, 0x33]),
        write([0x23, 0x00, 0x33]),
    ]
}

#[test]
fn color_bars_bring_up_on_the_wire() {
    let mut expectations = bring_up_until_read_mode();
    expectations.extend(vec![
        // Snapshot bit dropped
        I2cTransaction::write_read(ADDR, vec![0x1E], vec![0x41, 0x06]),
        write([0x1E, 0x40, 0x06]),
        // Mirror bits dropped, the rest kept
        I2cTransaction::write_read(ADDR, vec![0x20], vec![0xC0, 0x40]),
        write([0x20, 0x00, 0x40]),
        write([0x0A, 0x80, 0x00]),
        write([0xA0, 0x00, 0x41]),
        write([0xA2, 0x00, 0x80]),
        write([0xA1, 0x0F, 0xFF]),
        write([0xA3, 0x0A, 0x80]),
        write([0xA4, 0x00, 0x08]),
        I2cTransaction::write_read(ADDR, vec![0x07], vec![0x1F, 0x80]),
        write([0x07, 0x1F, 0x82]),
    ]);

    let handoff = FrameHandoff::new(Controller::new(Block::new(), AckMode::StatusRegister));
    let mut camera = Camera::new(I2cMock::new(&expectations), &handoff);
    let options = SensorOptions::default().with_test_pattern(TestPattern::default());
    camera.configure(&options).unwrap();
    camera.free().done();
}

#[test]
fn failed_baseline_read_stops_bring_up() {
    let mut expectations = bring_up_until_read_mode();
    expectations.push(
        I2cTransaction::write_read(ADDR, vec![0x1E], vec![0x00, 0x00])
            .with_error(MockError::Io(ErrorKind::Other)),
    );

    let handoff = FrameHandoff::new(Controller::new(Block::new(), AckMode::StatusRegister));
    let mut camera = Camera::new(I2cMock::new(&expectations), &handoff);
    let err = camera.configure(&SensorOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(err.register(), Some(0x1E));
    camera.free().done();
}

#[test]
fn ping_pong_through_a_static_handoff() {
    let pair = PingPong::new(0x2000_0000).unwrap();
    let camera = Camera::new(I2cMock::new(&[]), &HANDOFF);
    let mut notifier = InterruptNotifier;
    let mut delay = MockNoop::new();

    camera.start(&mut notifier);
    camera.arm(pair.first()).unwrap();
    camera.queue_next(pair.second()).unwrap();

    let mut captured: Vec<BufferHandle> = Vec::new();
    for _ in 0..4 {
        // Frame-complete interrupt
        HANDOFF.controller().regs().raise();
        assert!(HANDOFF.on_interrupt());

        let frame = camera
            .wait_for_frame(&mut notifier, &mut delay, 10_000)
            .unwrap();
        captured.push(frame);
        camera.recycle(frame).unwrap();
    }

    assert_eq!(
        captured,
        vec![pair.first(), pair.second(), pair.first(), pair.second()]
    );
    assert_eq!(HANDOFF.overruns(), 0);
    assert_eq!(HANDOFF.frames(), 4);

    camera.cancel();
    assert!(matches!(
        camera.wait_for_frame(&mut notifier, &mut delay, 10_000),
        Err(Error::Cancelled)
    ));
    camera.free().done();
}
