//! Zynq-7000 GEM diagnostic: board entry point
//!
//! Brings up the console, MMU, caches, timer and GIC, then hands GEM0 to the
//! driver for the configured number of loopback transactions. Host builds
//! only print the run configuration.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod board {
    use core::panic::PanicInfo;
    use core::ptr::addr_of_mut;
    use gemdiag::arch::armv7a::{self, cache::CpuCache, mmu};
    use gemdiag::config::DriverConfig;
    use gemdiag::drivers::clk::zynq_slcr::ZynqSlcr;
    use gemdiag::drivers::clocksource::global_timer::GlobalTimer;
    use gemdiag::drivers::irqchip::scu_gic::{GIC, SharedGic, irq, report_unhandled};
    use gemdiag::drivers::net::NetworkError;
    use gemdiag::drivers::net::ethernet::cadence::dma::DmaArena;
    use gemdiag::drivers::net::ethernet::cadence::gem::{
        GEM_CONFIG_TABLE, GemController, lookup_config,
    };
    use gemdiag::drivers::net::ethernet::cadence::intr::{CompletionCounters, CompletionHandlers};
    use gemdiag::drivers::net::ethernet::cadence::{Resources, RunSummary, initialize};
    use gemdiag::net::ethernet::{FRAME_CAPACITY, FrameBuffer};
    use gemdiag::println;
    use lazy_static::lazy_static;

    const GEM0_DEVICE_ID: u16 = 0;

    /// One MMU section, mapped uncached, for both descriptor rings
    const BD_SPACE_SIZE: usize = mmu::SECTION_SIZE;

    #[repr(C, align(1048576))]
    struct BdSpace([u8; BD_SPACE_SIZE]);

    static mut BD_SPACE: BdSpace = BdSpace([0; BD_SPACE_SIZE]);
    static mut TX_FRAME: FrameBuffer = FrameBuffer::new();
    static mut RX_FRAME: FrameBuffer = FrameBuffer::new();

    static COUNTERS: CompletionCounters = CompletionCounters::new();
    static CACHE: CpuCache = CpuCache;

    /// Interrupt-side view of GEM0
    // SAFETY: only ever services interrupts
    static GEM0_IRQ: GemController = unsafe { GemController::new(GEM_CONFIG_TABLE[0]) };

    lazy_static! {
        static ref HANDLERS: CompletionHandlers<'static> = CompletionHandlers::new(
            &COUNTERS,
            &CACHE,
            (&raw const RX_FRAME) as usize,
            FRAME_CAPACITY,
            GEM_CONFIG_TABLE[0].cache_coherent,
        );
    }

    fn gem0_isr() {
        GEM0_IRQ.service_interrupt(&*HANDLERS);
    }

    fn run(timer: &GlobalTimer) -> Result<RunSummary, NetworkError> {
        let config = lookup_config(GEM0_DEVICE_ID).ok_or(NetworkError::DeviceNotFound {
            device_id: GEM0_DEVICE_ID,
        })?;
        // SAFETY: GEM0 is mapped as device memory by mmu::init and this is
        // the only instance that configures it
        let mac = unsafe { GemController::new(config) };
        let mut slcr = ZynqSlcr::new();

        // SAFETY: the statics below are handed out exactly once, here
        let (arena, tx_frame, rx_frame) = unsafe {
            (
                DmaArena::new(&mut (*addr_of_mut!(BD_SPACE)).0),
                &mut *addr_of_mut!(TX_FRAME),
                &mut *addr_of_mut!(RX_FRAME),
            )
        };

        initialize(
            &mut SharedGic,
            mac,
            GEM0_DEVICE_ID,
            irq::GEM0,
            gem0_isr,
            Resources {
                clock: timer,
                cache: &CACHE,
                slcr: &mut slcr,
                arena,
                tx_frame,
                rx_frame,
                counters: &COUNTERS,
                config: DriverConfig::new(),
            },
        )
    }

    /// Rust entry point called from boot.s
    #[unsafe(no_mangle)]
    pub extern "C" fn _start_rust() -> ! {
        gemdiag::init();
        println!("[GEM] Zynq-7000 GEM loopback diagnostic");

        // SAFETY: first step after boot.s, IRQs masked, single core
        unsafe { mmu::init((&raw const BD_SPACE) as usize, BD_SPACE_SIZE) };
        CACHE.enable_l2();

        let timer = GlobalTimer::new();
        timer.init();
        GIC.lock().init();
        lazy_static::initialize(&HANDLERS);
        armv7a::enable_irq();

        match run(&timer) {
            Ok(summary) => println!(
                "[GEM] Done: PHY {} at {} Mb/s, {} ok, {} failed",
                summary.link.phy_addr,
                summary.link.speed.mbps(),
                summary.completed,
                summary.failed
            ),
            Err(e) => println!("[FAIL] Diagnostic aborted: {}", e),
        }

        loop {
            report_unhandled();
            armv7a::wait_for_interrupt();
        }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        armv7a::disable_irq();
        println!("[FAIL] {}", info);
        loop {
            armv7a::wait_for_interrupt();
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("gemdiag runs bare-metal on a Zynq-7000 (build for armv7a-none-eabi)");
    eprintln!("{:#?}", gemdiag::config::DriverConfig::new());
}
