//! PMW3610 low-power optical mouse sensor
//!
//! Register-level driver over blocking SPI. Only the features the trackball
//! needs are implemented: initialization, motion burst reads and run-time
//! resolution changes.

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::OutputPin;

use crate::utils::InfallibleResult;

// Page 0 registers
const REG_PROD_ID: u8 = 0x00;
const REG_MOTION: u8 = 0x02;
const REG_DELTA_XY_H: u8 = 0x05;
const REG_PERFORMANCE: u8 = 0x11;
const REG_BURST_READ: u8 = 0x12;
const REG_RUN_DOWNSHIFT: u8 = 0x1b;
const REG_REST1_RATE: u8 = 0x1c;
const REG_REST1_DOWNSHIFT: u8 = 0x1d;
const REG_OBSERVATION1: u8 = 0x2d;
const REG_POWER_UP_RESET: u8 = 0x3a;
const REG_SPI_CLK_ON_REQ: u8 = 0x41;
// Page select lives at 0x7f on both pages
const REG_SPI_PAGE0: u8 = 0x7f;

// Page 1 registers
const REG_RES_STEP: u8 = 0x05;
const REG_SPI_PAGE1: u8 = 0x7f;

// Burst register offsets
const BURST_MOTION: usize = 0;
const BURST_DELTA_X_L: usize = 1;
const BURST_DELTA_Y_L: usize = 2;
const BURST_DELTA_XY_H: usize = 3;
const BURST_DATA_LEN: usize = BURST_DELTA_XY_H + 1;

// Init sequence values
const OBSERVATION1_INIT_MASK: u8 = 0x0f;
const PERFORMANCE_INIT: u8 = 0x0d;
const RUN_DOWNSHIFT_INIT: u8 = 0x04;
const REST1_RATE_INIT: u8 = 0x04;
const REST1_DOWNSHIFT_INIT: u8 = 0x0f;

const PRODUCT_ID: u8 = 0x3e;
const SPI_WRITE: u8 = 0x80;
const MOTION_STATUS_MOTION: u8 = 0x80;
const SPI_CLOCK_ON_REQ_ON: u8 = 0xba;
const SPI_CLOCK_ON_REQ_OFF: u8 = 0xb5;
const RES_STEP_SWAP_XY_BIT: u8 = 7;
const RES_STEP_INV_X_BIT: u8 = 6;
const RES_STEP_INV_Y_BIT: u8 = 5;
const RES_STEP_RES_MASK: u8 = 0x1f;
const POWER_UP_RESET_VAL: u8 = 0x5a;
const SPI_PAGE0_1: u8 = 0xff;
const SPI_PAGE1_0: u8 = 0x00;

const DELTA_BITS: usize = 12;

// Timing constants from the datasheet
const RESET_DELAY_MS: u32 = 10;
const INIT_OBSERVATION_DELAY_MS: u32 = 10;
const CLOCK_ON_DELAY_US: u32 = 300;
const T_NCS_SCLK_US: u32 = 1;
const T_SRAD_US: u32 = 5;
const T_SRX_US: u32 = 2;
const T_SWX_US: u32 = 35;
const T_SCLK_NCS_WR_US: u32 = 20;
const T_BEXIT_US: u32 = 2;

/// Resolution limits, in counts per inch
pub const CPI_MIN: u16 = 200;
pub const CPI_MAX: u16 = 3200;
pub const CPI_STEP: u16 = 200;

/// Sensor configuration applied during initialization
pub struct Config {
    /// Initial resolution in CPI
    pub cpi: u16,
    /// Invert X axis
    pub invert_x: bool,
    /// Invert Y axis
    pub invert_y: bool,
    /// Swap X and Y axes
    pub swap_xy: bool,
}

/// Sensor driver errors
#[derive(Clone, Copy, PartialEq, defmt::Format)]
#[cfg_attr(test, derive(Debug))]
pub enum Error {
    /// SPI communication error
    Spi,
    /// Unexpected product ID
    InvalidProductId(u8),
    /// Initialization self-check failed
    InitFailed,
    /// Resolution out of the supported range
    InvalidCpi,
}

/// PMW3610 driver
pub struct Pmw3610<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> Pmw3610<SPI, CS>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin<Error = core::convert::Infallible>,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    /// Run the power-up sequence and apply `config`
    pub fn init<D>(&mut self, config: &Config, delay: &mut D) -> Result<(), Error>
    where
        D: DelayUs<u32> + DelayMs<u32>,
    {
        self.cs.set_high().infallible();
        delay.delay_ms(1);

        self.write_reg(REG_POWER_UP_RESET, POWER_UP_RESET_VAL, delay)?;
        delay.delay_ms(RESET_DELAY_MS);

        let id = self.read_reg(REG_PROD_ID, delay)?;
        if id != PRODUCT_ID {
            defmt::error!("Invalid sensor product id: {=u8:#x}", id);
            return Err(Error::InvalidProductId(id));
        }

        self.spi_clk_on(delay)?;

        self.write_reg(REG_OBSERVATION1, 0, delay)?;
        delay.delay_ms(INIT_OBSERVATION_DELAY_MS);
        let observation = self.read_reg(REG_OBSERVATION1, delay)?;
        if (observation & OBSERVATION1_INIT_MASK) != OBSERVATION1_INIT_MASK {
            defmt::error!("Unexpected OBSERVATION1 value: {=u8:#x}", observation);
            return Err(Error::InitFailed);
        }

        // Clear residual motion data
        for reg in REG_MOTION..=REG_DELTA_XY_H {
            self.read_reg(reg, delay)?;
        }

        self.write_reg(REG_PERFORMANCE, PERFORMANCE_INIT, delay)?;
        self.write_reg(REG_RUN_DOWNSHIFT, RUN_DOWNSHIFT_INIT, delay)?;
        self.write_reg(REG_REST1_RATE, REST1_RATE_INIT, delay)?;
        self.write_reg(REG_REST1_DOWNSHIFT, REST1_DOWNSHIFT_INIT, delay)?;

        // Axis orientation bits share the resolution register on page 1
        self.write_reg(REG_SPI_PAGE0, SPI_PAGE0_1, delay)?;
        let mut res_step = self.read_reg(REG_RES_STEP, delay)?;
        for (bit, on) in [
            (RES_STEP_SWAP_XY_BIT, config.swap_xy),
            (RES_STEP_INV_X_BIT, config.invert_x),
            (RES_STEP_INV_Y_BIT, config.invert_y),
        ] {
            if on {
                res_step |= 1 << bit;
            } else {
                res_step &= !(1 << bit);
            }
        }
        self.write_reg(REG_RES_STEP, res_step, delay)?;
        self.write_reg(REG_SPI_PAGE1, SPI_PAGE1_0, delay)?;

        self.spi_clk_off(delay)?;

        self.set_cpi(config.cpi, delay)?;

        defmt::info!("Sensor initialized at {=u16} CPI", config.cpi);
        Ok(())
    }

    /// Set sensor resolution
    pub fn set_cpi<D>(&mut self, cpi: u16, delay: &mut D) -> Result<(), Error>
    where
        D: DelayUs<u32>,
    {
        if !(CPI_MIN..=CPI_MAX).contains(&cpi) || cpi % CPI_STEP != 0 {
            return Err(Error::InvalidCpi);
        }

        self.spi_clk_on(delay)?;
        self.write_reg(REG_SPI_PAGE0, SPI_PAGE0_1, delay)?;

        let mut res_step = self.read_reg(REG_RES_STEP, delay)?;
        res_step &= !RES_STEP_RES_MASK;
        res_step |= (cpi / CPI_STEP) as u8;
        self.write_reg(REG_RES_STEP, res_step, delay)?;

        self.write_reg(REG_SPI_PAGE1, SPI_PAGE1_0, delay)?;
        self.spi_clk_off(delay)?;
        Ok(())
    }

    /// Read accumulated motion; returns (0, 0) when the ball has not moved
    pub fn motion<D>(&mut self, delay: &mut D) -> Result<(i16, i16), Error>
    where
        D: DelayUs<u32>,
    {
        let mut burst = [0; BURST_DATA_LEN];
        self.read_burst(REG_BURST_READ, &mut burst, delay)?;

        if burst[BURST_MOTION] & MOTION_STATUS_MOTION == 0 {
            return Ok((0, 0));
        }

        let x = ((burst[BURST_DELTA_XY_H] as u16) << 4) & 0xf00 | burst[BURST_DELTA_X_L] as u16;
        let y = ((burst[BURST_DELTA_XY_H] as u16) << 8) & 0xf00 | burst[BURST_DELTA_Y_L] as u16;

        Ok((sign_extend(x, DELTA_BITS), sign_extend(y, DELTA_BITS)))
    }

    fn read_reg<D: DelayUs<u32>>(&mut self, addr: u8, delay: &mut D) -> Result<u8, Error> {
        self.cs.set_low().infallible();
        delay.delay_us(T_NCS_SCLK_US);

        self.spi.write(&[addr & 0x7f]).map_err(|_| Error::Spi)?;
        delay.delay_us(T_SRAD_US);

        let mut value = [0];
        self.spi.transfer(&mut value).map_err(|_| Error::Spi)?;

        self.cs.set_high().infallible();
        delay.delay_us(T_SRX_US);
        Ok(value[0])
    }

    fn read_burst<D: DelayUs<u32>>(
        &mut self,
        addr: u8,
        data: &mut [u8],
        delay: &mut D,
    ) -> Result<(), Error> {
        self.cs.set_low().infallible();
        delay.delay_us(T_NCS_SCLK_US);

        self.spi.write(&[addr & 0x7f]).map_err(|_| Error::Spi)?;
        delay.delay_us(T_SRAD_US);

        self.spi.transfer(data).map_err(|_| Error::Spi)?;

        self.cs.set_high().infallible();
        delay.delay_us(T_BEXIT_US);
        Ok(())
    }

    fn write_reg<D: DelayUs<u32>>(&mut self, addr: u8, value: u8, delay: &mut D) -> Result<(), Error> {
        self.cs.set_low().infallible();
        delay.delay_us(T_NCS_SCLK_US);

        self.spi.write(&[addr | SPI_WRITE, value]).map_err(|_| Error::Spi)?;
        delay.delay_us(T_SCLK_NCS_WR_US);

        self.cs.set_high().infallible();
        delay.delay_us(T_SWX_US);
        Ok(())
    }

    // Register writes require the internal SPI clock, which is off by default
    // in low-power operation and must be requested explicitly
    fn spi_clk_on<D: DelayUs<u32>>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.write_reg(REG_SPI_CLK_ON_REQ, SPI_CLOCK_ON_REQ_ON, delay)?;
        delay.delay_us(CLOCK_ON_DELAY_US);
        Ok(())
    }

    fn spi_clk_off<D: DelayUs<u32>>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.write_reg(REG_SPI_CLK_ON_REQ, SPI_CLOCK_ON_REQ_OFF, delay)
    }
}

fn sign_extend(value: u16, bits: usize) -> i16 {
    let sign_bit = 1 << (bits - 1);
    if value & sign_bit != 0 {
        (value | !((1 << bits) - 1)) as i16
    } else {
        value as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_extend_positive() {
        assert_eq!(sign_extend(0x000, DELTA_BITS), 0);
        assert_eq!(sign_extend(0x001, DELTA_BITS), 1);
        assert_eq!(sign_extend(0x7ff, DELTA_BITS), 2047);
    }

    #[test]
    fn sign_extend_negative() {
        assert_eq!(sign_extend(0xfff, DELTA_BITS), -1);
        assert_eq!(sign_extend(0x800, DELTA_BITS), -2048);
        assert_eq!(sign_extend(0xffe, DELTA_BITS), -2);
    }

    #[test]
    fn delta_unpacking() {
        // high nibbles of both deltas share one burst byte
        let burst = [MOTION_STATUS_MOTION, 0x34, 0xcd, 0x1f];
        let x = ((burst[BURST_DELTA_XY_H] as u16) << 4) & 0xf00 | burst[BURST_DELTA_X_L] as u16;
        let y = ((burst[BURST_DELTA_XY_H] as u16) << 8) & 0xf00 | burst[BURST_DELTA_Y_L] as u16;
        assert_eq!(sign_extend(x, DELTA_BITS), 0x134);
        assert_eq!(sign_extend(y, DELTA_BITS), -51);
    }
}
