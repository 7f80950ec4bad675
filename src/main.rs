#![no_main]
#![no_std]

use panic_probe as _;
use defmt_rtt as _;
use stm32f0xx_hal as hal;
use kugel as lib;

#[rtic::app(device = crate::hal::pac, dispatchers = [CEC_CAN])]
mod app {
    use cortex_m::interrupt::free as ifree;
    use super::hal;
    use hal::prelude::*;
    use usb_device::{prelude::*, class_prelude::UsbBusAllocator};

    use super::lib;
    use lib::bsp::{self, delay::CycleDelay, usb::{NoLeds, Usb}};
    use lib::hal_ext::{reboot, watchdog};
    use lib::{config, trackball};

    const DEBOUNCE_COUNT: u16 = 5;

    const WATCHDOG_PARAMS: watchdog::WindowParams =
        watchdog::WindowParams::new(24_000_000, 30_000, 70_000);

    #[shared]
    struct Shared {
        usb: Usb<NoLeds>,
    }

    #[local]
    struct Local {
        timer: hal::timers::Timer<hal::pac::TIM15>,
        trackball: trackball::Trackball<{ config::N_LAYERS }>,
        sensor: bsp::Sensor,
        sensor_ok: bool,
        delay: CycleDelay,
        watchdog: watchdog::WindowWatchdog,
    }

    #[monotonic(binds = SysTick, default = true)]
    type Mono = systick_monotonic::Systick<MONO_HZ>;
    pub const MONO_HZ: u32 = 1000;

    #[init(local = [
        usb_bus: Option<UsbBusAllocator<hal::usb::UsbBusType>> = None,
    ])]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        let mut core = cx.core;
        let mut dev = cx.device;

        // Automatically enter sleep mode when leaving an ISR
        if cfg!(feature = "idle-sleep") {
            core.SCB.set_sleeponexit();
        }

        // Clock configuration (may use external crystal, but it is not needed for STM32F072)
        let sysclk: hal::time::Hertz = 48.mhz().into();
        let pclk: hal::time::Hertz = 24.mhz().into();
        let crystal_clk: hal::time::Hertz = 12.mhz().into();

        let clk_config = dev.RCC
            .configure()
            .enable_crs(dev.CRS) // synchronization to USB SOF
            .sysclk(sysclk)
            .pclk(pclk);
        let clk_config = if cfg!(feature = "crystal") {
            clk_config.hse(crystal_clk, hal::rcc::HSEBypassMode::NotBypassed)
        } else {
            clk_config.hsi48()
        };
        let mut rcc = clk_config.freeze(&mut dev.FLASH);

        if watchdog::reset_flags::was_window_watchdog(&mut rcc) {
            defmt::warn!("Watchdog reset detected");
        }
        watchdog::reset_flags::clear(&mut rcc);

        // Pinout
        let gpioa = dev.GPIOA.split(&mut rcc);
        let gpiob = dev.GPIOB.split(&mut rcc);

        // Buttons: left, middle, right, back, forward
        let buttons = ifree(|cs| [
            gpiob.pb0.into_pull_up_input(cs).downgrade(),
            gpiob.pb1.into_pull_up_input(cs).downgrade(),
            gpiob.pb2.into_pull_up_input(cs).downgrade(),
            gpiob.pb3.into_pull_up_input(cs).downgrade(),
            gpiob.pb4.into_pull_up_input(cs).downgrade(),
        ]);

        // Optical sensor on SPI1
        let sck = ifree(|cs| gpioa.pa5.into_alternate_af0(cs));
        let miso = ifree(|cs| gpioa.pa6.into_alternate_af0(cs));
        let mosi = ifree(|cs| gpioa.pa7.into_alternate_af0(cs));
        let sensor_cs = ifree(|cs| gpioa.pa4.into_push_pull_output(cs));
        let spi = hal::spi::Spi::spi1(
            dev.SPI1,
            (sck, miso, mosi),
            embedded_hal::spi::MODE_3,
            2.mhz(),
            &mut rcc,
        );

        let mut delay = CycleDelay::new(sysclk.0);
        let mut sensor = bsp::sensor::Pmw3610::new(spi, sensor_cs);
        let sensor_ok = match sensor.init(&config::SENSOR, &mut delay) {
            Ok(()) => true,
            Err(err) => {
                defmt::error!("Sensor init failed: {}", err);
                false
            },
        };

        // Configure periodic timer
        let mut timer = hal::timers::Timer::tim15(dev.TIM15, 1.khz(), &mut rcc);
        timer.listen(hal::timers::Event::TimeOut);

        // USB
        let usb = hal::usb::Peripheral {
            usb: dev.USB,
            pin_dp: gpioa.pa12,
            pin_dm: gpioa.pa11,
        };
        *cx.local.usb_bus = Some(hal::usb::UsbBus::new(usb));
        let usb_bus = cx.local.usb_bus.as_ref().unwrap();

        let usb = Usb::new(usb_bus, NoLeds);

        // Trackball logic
        let trackball = trackball::Trackball::new(
            trackball::Keys::new(buttons, DEBOUNCE_COUNT),
            &config::CONFIG,
        );

        let mut watchdog = watchdog::WindowWatchdog::new(dev.WWDG, WATCHDOG_PARAMS);
        watchdog.stop_on_debug(true, &mut dev.DBGMCU, &mut rcc);
        if cfg!(feature = "watchdog") {
            watchdog.start(&mut rcc);
        }

        defmt::info!("Liftoff!");

        let shared = Shared { usb };

        let local = Local {
            timer,
            trackball,
            sensor,
            sensor_ok,
            delay,
            watchdog,
        };

        let mono = systick_monotonic::Systick::new(core.SYST, sysclk.0);

        (shared, local, init::Monotonics(mono))
    }

    #[task(binds = TIM15, priority = 4, local = [timer])]
    fn tick(cx: tick::Context) {
        // Clears interrupt flag
        if cx.local.timer.wait().is_ok() {
            if trackball_tick::spawn().is_err() {
                defmt::error!("Spawn failed: trackball_tick");
            }
        }
    }

    /// USB poll
    ///
    /// On an USB interrupt we need to handle all classes and receive/send proper data.
    /// This is always a response to USB host polling because host initializes all transactions.
    #[task(binds = USB, priority = 3, shared = [usb])]
    fn usb_poll(mut cx: usb_poll::Context) {
        cx.shared.usb.lock(|usb| {
            // UsbDevice.poll()->UsbBus.poll() inspects and clears USB interrupt flags.
            // If there was data packet to any class this will return true.
            let _was_packet = usb.poll();
        });
    }

    #[task(priority = 2, capacity = 1, shared = [usb], local = [trackball, sensor, sensor_ok, delay, watchdog])]
    fn trackball_tick(mut cx: trackball_tick::Context) {
        let trackball_tick::LocalResources {
            trackball,
            sensor,
            sensor_ok,
            delay,
            watchdog,
            ..
        } = cx.local;

        // Poll ball motion
        if *sensor_ok {
            match sensor.motion(delay) {
                Ok(motion) => trackball.update_motion(motion),
                Err(err) => {
                    defmt::error!("Sensor read failed: {}", err);
                    *sensor_ok = false;
                },
            }
        }

        // Run trackball logic and push USB reports
        let update = cx.shared.usb.lock(|usb| trackball.tick(usb));

        // Apply deferred hardware updates
        if let Some(cpi) = update.cpi {
            if *sensor_ok {
                if let Err(err) = sensor.set_cpi(cpi, delay) {
                    defmt::error!("Setting CPI failed: {}", err);
                }
            }
        }
        if update.reboot {
            defmt::info!("Rebooting to bootloader");
            cx.shared.usb.lock(|usb| {
                unsafe { reboot::reboot(true, Some(usb.dev.bus())) }
            });
        }

        watchdog.maybe_feed();
    }

    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        loop {
            if cfg!(feature = "idle-sleep") {
                rtic::export::wfi();
            } else {
                rtic::export::nop();
            }
        }
    }
}
