//! Board support package
//!
//! Code that builds on top of the MCU HAL to implement support for the board
//! and the peripherals located on it: the 5 buttons, the optical sensor and
//! the USB port.

pub mod delay;
pub mod sensor;
pub mod usb;

use crate::hal::{gpio, pac, spi};

/// Number of physical buttons: left, middle, right, back, forward
pub const NKEYS: usize = 5;

pub type ButtonPin = gpio::Pin<gpio::Input<gpio::PullUp>>;

type SensorSck = gpio::gpioa::PA5<gpio::Alternate<gpio::AF0>>;
type SensorMiso = gpio::gpioa::PA6<gpio::Alternate<gpio::AF0>>;
type SensorMosi = gpio::gpioa::PA7<gpio::Alternate<gpio::AF0>>;
pub type SensorSpi = spi::Spi<pac::SPI1, SensorSck, SensorMiso, SensorMosi, spi::EightBit>;
pub type SensorCs = gpio::gpioa::PA4<gpio::Output<gpio::PushPull>>;

pub type Sensor = sensor::Pmw3610<SensorSpi, SensorCs>;
