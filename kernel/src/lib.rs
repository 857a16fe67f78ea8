#![cfg_attr(not(test), no_std)]
#![allow(dead_code)]

extern crate alloc;

mod arch;
mod bootinfo;
mod config;
mod mem;
mod proc;
mod sync;

#[cfg(target_arch = "x86")]
mod logging;

pub use bootinfo::{BootInfo, ImageRegion};
pub use config::Config;

#[cfg(target_arch = "x86")]
use crate::arch::x86;

/// Entry point called by the boot stub in 32-bit protected mode, interrupts disabled.
#[cfg(target_arch = "x86")]
#[unsafe(no_mangle)]
pub extern "C" fn kernel_main(boot_info: &BootInfo) -> ! {
    let serial_ok = x86::serial::init();

    // only fails if a logger is already installed
    let _ = logging::init(log::LevelFilter::Info);
    if !serial_ok {
        log::warn!("Serial self-test failed, console output may be lost");
    }
    if !boot_info.is_valid() {
        log::warn!("Boot info magic {:#x} not recognised", boot_info.magic);
    }

    let config = Config::from_cmdline(boot_info.cmdline());
    logging::set_level(config.log_level);
    log::debug!("{:?}", config);

    if boot_info.heap_size < mem::heap::MIN_HEAP_SIZE {
        panic!("Heap region of {} bytes is too small", boot_info.heap_size);
    }
    // SAFETY: the boot stub reserves this region for the kernel heap.
    unsafe { mem::heap::init(boot_info.heap_start, boot_info.heap_size) };

    x86::init();
    proc::manager::init();

    let mut started = 0;
    for image in boot_info.images() {
        if let Ok(pid) = proc::manager::spawn_image(image, config.stack_size) {
            log::info!("Started boot image as pid {}", pid);
            started += 1;
        }
    }
    if started == 0 {
        log::warn!("No program images started, only the boot thread will run");
    }

    let (free, used) = mem::heap::heap_stats();
    log::debug!("Heap after boot: {} KiB used, {} KiB free", used / 1024, free / 1024);

    proc::manager::enumerate();
    x86::enable_interrupts();

    if config.user_mode {
        log::info!("Dropping the boot thread to ring 3");
        x86::usermode::switch_to_user_mode();

        // hlt is privileged from here on
        loop {
            core::hint::spin_loop();
        }
    }

    loop {
        x86::halt();
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log::error!("KERNEL PANIC: {}", info);

    loop {
        #[cfg(target_arch = "x86")]
        {
            x86::disable_interrupts();
            x86::halt();
        }
        #[cfg(not(target_arch = "x86"))]
        core::hint::spin_loop();
    }
}
