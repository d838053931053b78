#![no_std]
#![no_main]

mod controllers;
mod infrastructure;
mod net;

use core::cell::RefCell;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_time::Duration;
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{clock::CpuClock, delay::Delay, timer::timg::TimerGroup};
use esp_println::println;
use lightwave_ota::{FeedbackPainter, OtaService, TokenStore};

use crate::controllers::LightwaveHttpController;
use crate::infrastructure::config;
use crate::infrastructure::drivers::{
    EspEntropy, EspLedDriver, LedStripMutex, SharedLedStrip, init_flash_storage_mutex,
    init_network_stack,
};
use crate::infrastructure::repositories::FlashKeyValueStore;
use crate::infrastructure::services::{DeferredRestart, EspFirmwareFlasher};
use crate::infrastructure::tasks::{
    HTTP_WORKERS, http_server_task, network_runner_task, render_task, restart_task,
    wifi_connection_task,
};
use crate::infrastructure::types::{
    FEEDBACK_INDICATOR, OtaServiceMutex, OtaTokens, SESSION_LOCK,
};

esp_bootloader_esp_idf::esp_app_desc!();

// static_cell::make_static! in main causes a compiler error
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();

    // Initialize hardware
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    // The radio driver allocates
    esp_alloc::heap_allocator!(
        #[unsafe(link_section = ".dram2_uninit")] size: 64 * 1024
    );

    // Start rtos
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    println!(
        "{}: firmware {} built {}",
        config::DEVICE.name,
        config::BUILD_VERSION,
        config::BUILD_TIMESTAMP
    );

    let flash = init_flash_storage_mutex(peripherals.FLASH);
    let flasher = EspFirmwareFlasher::new(flash);
    flasher.handle_boot_state();

    // LED strip shared by the idle renderer and the update feedback
    let strip = mk_static!(
        LedStripMutex,
        Mutex::new(RefCell::new(EspLedDriver::new(
            peripherals.RMT,
            led_gpio!(peripherals)
        )))
    );
    let strip = SharedLedStrip::new(strip);
    spawner.spawn(render_task(strip, &FEEDBACK_INDICATOR)).ok();
    spawner.spawn(restart_task()).ok();

    // Initialize network stack and spawn network tasks
    let (stack, runner, controller) = init_network_stack(peripherals.WIFI);
    spawner
        .spawn(wifi_connection_task(controller, &SESSION_LOCK))
        .ok();
    spawner.spawn(network_runner_task(runner)).ok();

    let ip = net::wait_for_connection(stack).await;
    println!("{}: online at {}", config::DEVICE.hostname, ip.address);

    // The RNG only yields entropy once the radio is up, so a first-boot
    // token is generated here rather than before the network.
    let tokens: &'static OtaTokens = mk_static!(
        OtaTokens,
        Mutex::new(RefCell::new(TokenStore::new(
            FlashKeyValueStore::new(flash, config::STORAGE.store_offset),
            EspEntropy::new(),
            config::SECURITY.fallback_token,
        )))
    );
    let persisted = tokens.lock(|cell| cell.borrow_mut().init());
    println!(
        "ota: token ready ({})",
        if persisted { "persisted" } else { "compile-time fallback" }
    );

    let painter = FeedbackPainter::new(&FEEDBACK_INDICATOR, strip, Delay::new())
        .with_center(config::LIGHT.feedback_center);
    let ota: &'static OtaServiceMutex = mk_static!(
        OtaServiceMutex,
        AsyncMutex::new(OtaService::new(
            config::OTA,
            &SESSION_LOCK,
            tokens,
            flasher,
            painter,
            DeferredRestart,
        ))
    );

    let http_controller: &'static LightwaveHttpController = mk_static!(
        LightwaveHttpController,
        LightwaveHttpController::new(ota, tokens)
    );
    for _ in 0..HTTP_WORKERS {
        spawner.spawn(http_server_task(stack, http_controller)).ok();
    }

    loop {
        embassy_time::Timer::after(Duration::from_secs(5)).await;
    }
}
