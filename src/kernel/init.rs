//! Boot phases.
//!
//! Interrupts stay masked until every phase has completed; the first
//! failing phase aborts the boot with its error.

use crate::arch::{Cpu, InterruptController, Platform};
use crate::drivers::RtcDevice;
use crate::interrupts::pic::Irq;
use crate::interrupts::timer;
use crate::kernel::status::{InitStatus, DESCRIPTOR_TABLES, INTERRUPT_CONTROLLER, PAGING, PHASES, TIMER};
use crate::kernel::Kernel;

type Phase<K> = fn(&mut K) -> Result<(), &'static str>;

impl<P: Platform> Kernel<P> {
    pub fn init(&mut self) -> Result<(), &'static str> {
        self.machine.cpu.disable_interrupts();
        kprintln!("vterm-kernel: booting");

        self.init_phase(DESCRIPTOR_TABLES, Self::init_descriptor_tables)?;
        self.init_phase(PAGING, Self::init_paging)?;
        self.init_phase(INTERRUPT_CONTROLLER, Self::init_interrupt_controller)?;
        self.init_phase(TIMER, Self::init_timer)?;

        self.machine.cpu.enable_interrupts();
        kprintln!("vterm-kernel: ready");
        Ok(())
    }

    fn init_phase(&mut self, name: &'static str, phase: Phase<Self>) -> Result<(), &'static str> {
        let position = PHASES.iter().position(|&p| p == name).map_or(0, |i| i + 1);
        self.status.update(name, InitStatus::InProgress);
        log::info!("[{}/{}] {}", position, PHASES.len(), name);

        match phase(self) {
            Ok(()) => {
                self.status.update(name, InitStatus::Completed);
                Ok(())
            }
            Err(err) => {
                self.status.update(name, InitStatus::Failed(err));
                log::error!("{} failed: {}", name, err);
                Err(err)
            }
        }
    }

    fn init_descriptor_tables(&mut self) -> Result<(), &'static str> {
        let entries = self.machine.entry_points;
        self.idt.install_all_ignored(&entries);
        self.idt.install_exception_handlers(&entries);
        self.idt.install_device_handlers(&entries);
        self.machine.cpu.load_descriptor_table(self.idt.pointer());
        Ok(())
    }

    fn init_paging(&mut self) -> Result<(), &'static str> {
        let locations = P::locate_tables(&self.address_space);
        let aligned = [locations.directory, locations.low_table, locations.user_video_table]
            .iter()
            .all(|table| table.is_aligned(crate::config::PAGE_SIZE));
        if !aligned {
            return Err("page tables are not page aligned");
        }
        self.address_space.init(locations);
        self.address_space.activate(&mut self.machine.cpu);
        Ok(())
    }

    fn init_interrupt_controller(&mut self) -> Result<(), &'static str> {
        self.machine.pic.initialize();
        self.machine.pic.enable_irq(Irq::Keyboard.line());
        self.machine.pic.enable_irq(Irq::Rtc.line());
        self.machine.rtc.open();
        self.machine.pic.enable_irq(Irq::Timer.line());
        Ok(())
    }

    fn init_timer(&mut self) -> Result<(), &'static str> {
        let divisor = timer::program(&mut self.machine.cpu, self.config.timer_hz)?;
        log::debug!("PIT divisor {} for {} Hz", divisor, self.config.timer_hz);
        Ok(())
    }
}
