//! 机器人间红外演示
//!
//! 广播两对红外编码，同时监听其他机器人发来的红外消息，Ctrl+C 退出。

use clap::Parser;
use rvr_sdk::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "infrared_broadcast")]
#[command(about = "红外广播演示 - 广播编码对并打印收到的红外消息")]
struct Args {
    /// 串口路径
    #[arg(long, default_value = "/dev/ttyS0")]
    port: String,

    /// 同时发送的消息强度（0-64）
    #[arg(long, default_value = "32")]
    strength: u8,

    /// 遇到失败立即停止批量下发
    #[arg(long)]
    stop_on_error: bool,
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    rvr_sdk::init_logger().ok();

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;

    let rvr = Arc::new(RvrBuilder::new().port(&args.port).build()?);
    rvr.wake()?;

    let policy = if args.stop_on_error {
        BatchPolicy::StopOnError
    } else {
        BatchPolicy::ContinueOnError
    };
    let infrared = InfraredControl::new(rvr.clone()).with_batch_policy(policy);

    let listener = infrared.listen_for_infrared_message(|code| {
        println!("Received infrared message: {:?}", code);
    })?;

    infrared.start_infrared_broadcasting(
        &[InfraredCode::Code0, InfraredCode::Code1],
        &[InfraredCode::Code2, InfraredCode::Code3],
    )?;
    infrared.send_infrared_messages(&[InfraredCode::Code4, InfraredCode::Code5], args.strength)?;
    println!("Broadcasting, press Ctrl+C to stop");

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    infrared.stop_infrared_broadcasting()?;
    rvr.enable_robot_infrared_message_notify(false)?;
    rvr.remove_infrared_message_handler(listener);
    rvr.disconnect();
    Ok(())
}
