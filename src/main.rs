// src/main.rs

//! Max OS kernel binary.
//!
//! Boot sequence: descriptor tables, kernel heap, serial log, interrupt
//! controller and timer, then the kernel context itself with a pair of
//! demo processes exercising IPC and sleep. Once interrupts are enabled
//! the boot context becomes the idle thread's backing and the timer
//! drives everything from there.
//!
//! Only the bare-metal target gets a real entry point; on the host this
//! binary is a stub and the whole core is exercised through `cargo test`.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(not(target_os = "none"))]
fn main() {
    println!("max_os only boots on the x86_64-max_os target; run `cargo test` on the host.");
}

#[cfg(target_os = "none")]
mod boot {
    extern crate alloc;

    use alloc::boxed::Box;
    use core::panic::PanicInfo;

    use bootloader_api::config::Mapping;
    use bootloader_api::{entry_point, BootInfo, BootloaderConfig};

    use max_os::arch::x86_64::cpu::cpu_summary;
    use max_os::arch::x86_64::pic::ChainedPics;
    use max_os::arch::x86_64::qemu::{exit_qemu, QemuExitCode};
    use max_os::arch::x86_64::syscall::{syscall1, syscall2, syscall3, syscall4, yield_now};
    use max_os::arch::x86_64::{init_gdt, init_idt};
    use max_os::arch::{ArchCpu, Cpu};
    use max_os::kernel::driver::pit::ProgrammableIntervalTimer;
    use max_os::kernel::driver::serial::SERIAL1;
    use max_os::kernel::driver::Device;
    use max_os::kernel::interrupts::HARDWARE_VECTOR_BASE;
    use max_os::kernel::mm::LockedHeap;
    use max_os::kernel::{install, with_kernel, Kernel, KernelConfig};
    use max_os::println;
    use max_os_abi::{decode_result, SyscallNumber};

    /// Bootloader configuration: dynamic mappings so the loader picks
    /// free virtual regions for the framebuffer and physical memory.
    pub static BOOTLOADER_CONFIG: BootloaderConfig = {
        let mut config = BootloaderConfig::new_default();
        config.mappings.framebuffer = Mapping::Dynamic;
        config.mappings.physical_memory = Some(Mapping::Dynamic);
        config
    };

    entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

    const HEAP_SIZE: usize = 8 * 1024 * 1024;

    #[global_allocator]
    static HEAP: LockedHeap = LockedHeap::empty();

    static mut HEAP_REGION: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

    fn kernel_main(_boot_info: &'static mut BootInfo) -> ! {
        // Raw COM1 output for the window before the heap and the serial
        // driver are up; println! needs both.
        macro_rules! serial_print {
            ($msg:expr) => {
                // SAFETY: 0x3F8 is COM1; nothing else touches it this
                // early in boot.
                unsafe {
                    let mut serial =
                        max_os::arch::x86_64::port::PortWriteOnly::<u8>::new(0x3F8);
                    for byte in $msg {
                        serial.write(*byte);
                    }
                }
            };
        }

        serial_print!(b"[KERNEL] Entry point reached\n");
        init_gdt();
        serial_print!(b"[KERNEL] GDT loaded\n");
        init_idt();
        serial_print!(b"[KERNEL] IDT loaded\n");

        // SAFETY: HEAP_REGION is reserved for the allocator and nothing
        // else ever references it.
        let heap_ok = unsafe {
            HEAP.init(core::ptr::addr_of_mut!(HEAP_REGION).cast::<u8>(), HEAP_SIZE)
        };
        if heap_ok.is_err() {
            serial_print!(b"[FAIL] Heap initialization failed\n");
            max_os::hlt_loop();
        }
        serial_print!(b"[OK] Heap initialized\n");

        let _ = SERIAL1.lock().init();

        let config = KernelConfig::default();

        println!("========================================");
        println!("  Max OS {} ({})", env!("CARGO_PKG_VERSION"), env!("BUILD_PROFILE"));
        println!("  target {}", env!("BUILD_TARGET"));
        println!("========================================");
        let cpu = cpu_summary();
        println!(
            "[cpu] vendor={} apic={} tsc={}",
            cpu.vendor.as_deref().unwrap_or("unknown"),
            cpu.has_apic,
            cpu.has_tsc
        );

        let mut pics = ChainedPics::new(HARDWARE_VECTOR_BASE, HARDWARE_VECTOR_BASE + 8);
        // SAFETY: runs once, before interrupts are enabled.
        unsafe {
            pics.initialize();
        }
        println!("[OK] PIC remapped to {:#x}", HARDWARE_VECTOR_BASE);

        let mut pit = ProgrammableIntervalTimer::new();
        if let Err(err) = pit.set_frequency(config.timer_hz) {
            println!("[FAIL] PIT: {err}");
            max_os::hlt_loop();
        }
        println!("[OK] PIT programmed to {} Hz", config.timer_hz);

        let kernel = match Kernel::new(config, Box::new(pics)) {
            Ok(kernel) => kernel,
            Err(err) => {
                println!("[FAIL] kernel: {err}");
                max_os::hlt_loop();
            }
        };
        if let Err(err) = install(kernel) {
            println!("[FAIL] install: {err}");
            max_os::hlt_loop();
        }

        with_kernel(|kernel| {
            if let Err(err) = kernel.scheduler.spawn_process("pong", pong_main) {
                println!("[FAIL] spawn pong: {err}");
            }
            if let Err(err) = kernel.scheduler.spawn_process("ping", ping_main) {
                println!("[FAIL] spawn ping: {err}");
            }
            if let Err(err) = kernel.scheduler.spawn_process("sleeper", sleeper_main) {
                println!("[FAIL] spawn sleeper: {err}");
            }
        });

        println!("[OK] Kernel initialized, enabling interrupts");
        ArchCpu::enable_interrupts();

        // From here on this context is the idle thread.
        max_os::hlt_loop();
    }

    fn klog(message: &str) {
        // SAFETY: pointer and length describe a live &str.
        unsafe {
            syscall2(
                SyscallNumber::Klog.as_u64(),
                message.as_ptr() as u64,
                message.len() as u64,
            );
        }
    }

    fn sleep(ticks: u64) {
        // SAFETY: ThreadSleep takes one plain integer argument.
        unsafe {
            syscall1(SyscallNumber::ThreadSleep.as_u64(), ticks);
        }
    }

    fn open_endpoint(name: &str) -> u64 {
        // SAFETY: pointer and length describe a live &str.
        unsafe {
            syscall2(
                SyscallNumber::CreateIpcEndpoint.as_u64(),
                name.as_ptr() as u64,
                name.len() as u64,
            )
        }
    }

    /// Demo sender: posts a few messages on the shared endpoint, pausing
    /// between them, then lets the trampoline retire the thread.
    extern "C" fn ping_main() {
        let handle = open_endpoint("demo.chat");
        for round in 0..5u64 {
            let message = alloc::format!("ping {round}");
            // SAFETY: handle plus a live payload slice.
            unsafe {
                syscall3(
                    SyscallNumber::SendIpcMessage.as_u64(),
                    handle,
                    message.as_ptr() as u64,
                    message.len() as u64,
                );
            }
            sleep(20);
        }
        klog("ping done");
    }

    /// Demo receiver: blocks on the endpoint and logs whatever arrives.
    extern "C" fn pong_main() {
        let handle = open_endpoint("demo.chat");
        let mut buffer = [0u8; 64];
        loop {
            // SAFETY: handle plus a live buffer slice.
            let raw = unsafe {
                syscall3(
                    SyscallNumber::ReceiveIpcMessage.as_u64(),
                    handle,
                    buffer.as_mut_ptr() as u64,
                    buffer.len() as u64,
                )
            };
            match decode_result(raw) {
                Ok(count) => {
                    let text =
                        core::str::from_utf8(&buffer[..count as usize]).unwrap_or("<binary>");
                    let line = alloc::format!("pong got: {text}");
                    klog(&line);
                    // Hand the rest of the slice back to the sender.
                    yield_now();
                }
                Err(err) => {
                    let line = alloc::format!("pong stopping: {err}");
                    klog(&line);
                    break;
                }
            }
        }
    }

    /// Demo sleeper: periodic heartbeat on the kernel log, with the beat
    /// count published through a shared memory region.
    extern "C" fn sleeper_main() {
        let name = "demo.stats";
        let mut base = 0u64;
        // SAFETY: the name slice and the out pointer are live locals.
        let created = unsafe {
            syscall4(
                SyscallNumber::CreateSharedMemory.as_u64(),
                name.as_ptr() as u64,
                name.len() as u64,
                64,
                core::ptr::addr_of_mut!(base) as u64,
            )
        };
        let publish = decode_result(created).is_ok() && base != 0;

        for beat in 0..10u64 {
            if publish {
                // SAFETY: base names the 64-byte region created above;
                // it lives until this process is torn down.
                unsafe { (base as *mut u64).write_volatile(beat) };
            }
            let line = alloc::format!("heartbeat {beat}");
            klog(&line);
            sleep(100);
        }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        ArchCpu::disable_interrupts();
        println!("[KERNEL PANIC] {info}");
        exit_qemu(QemuExitCode::Failed);
        max_os::hlt_loop()
    }
}
