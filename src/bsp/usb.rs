use usb_device::bus::UsbBusAllocator;
use usb_device::device::{UsbDevice, UsbDeviceBuilder, UsbVidPid};
use usbd_dfu_rt::DfuRuntimeClass;

use crate::hal::usb;
use crate::hal_ext::reboot;
use crate::trackball::hid::HidMouse;

type Bus = usb::UsbBusType;

/// Keyboard LED outputs are not used on the trackball
pub struct NoLeds;

impl keyberon::keyboard::Leds for NoLeds {}

/// USB resources and class implementations
pub struct Usb<L>
where
    L: keyberon::keyboard::Leds,
{
    pub dev: UsbDevice<'static, Bus>,
    /// Keyboard class carries the modifiers of modifier-wrapped clicks
    pub keyboard: keyberon::Class<'static, Bus, L>,
    pub mouse: HidMouse<'static, Bus>,
    pub dfu: DfuRuntimeClass<reboot::DfuBootloader>,
}

impl<L> Usb<L>
where
    L: keyberon::keyboard::Leds,
{
    pub fn new(bus: &'static UsbBusAllocator<Bus>, leds: L) -> Self {
        // Classes
        let keyboard = keyberon::new_class(bus, leds);
        let mouse = HidMouse::new(bus);
        let dfu = DfuRuntimeClass::new(bus, reboot::DfuBootloader);

        // Device
        // VID:PID recognised as Van Ooijen Technische Informatica:Mouse
        let generic_mouse = UsbVidPid(0x16c0, 0x27da);
        let dev = UsbDeviceBuilder::new(bus, generic_mouse)
            .manufacturer("kugel")
            .product("kugel trackball")
            .serial_number(env!("CARGO_PKG_VERSION"))
            .composite_with_iads()
            .build();

        Self { dev, keyboard, mouse, dfu }
    }

    /// Periodic USB poll
    pub fn poll(&mut self) -> bool {
        self.dev.poll(&mut [&mut self.keyboard, self.mouse.class(), &mut self.dfu])
    }
}
