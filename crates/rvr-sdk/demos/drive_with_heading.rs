//! 按航向行驶演示
//!
//! 唤醒 RVR，重置朝向后依次向前、向后、向右、向左各行驶一秒，最后停车。

use clap::Parser;
use rvr_sdk::prelude::*;
use std::thread;
use std::time::Duration;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "drive_with_heading")]
#[command(about = "按航向行驶演示 - 四个方向各行驶一秒")]
struct Args {
    /// 串口路径
    #[arg(long, default_value = "/dev/ttyS0")]
    port: String,

    /// 波特率（默认: 115200）
    #[arg(long, default_value = "115200")]
    baud_rate: u32,

    /// 速度（0-255，默认: 128）
    #[arg(long, default_value = "128")]
    speed: u8,
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    rvr_sdk::init_logger().ok();

    let rvr = RvrBuilder::new()
        .port(&args.port)
        .baud_rate(args.baud_rate)
        .build()?;
    println!("Connected to {} at {} baud", args.port, args.baud_rate);

    rvr.wake()?;
    // 后续航向相对于当前朝向
    rvr.reset_yaw()?;

    let legs = [
        ("forward", args.speed, 0, DriveFlags::forward()),
        ("backward", args.speed, 0, DriveFlags::backward()),
        ("right", args.speed, 90, DriveFlags::forward()),
        ("left", args.speed, 270, DriveFlags::forward()),
        ("face original heading", 0, 0, DriveFlags::forward()),
    ];
    for (name, speed, heading, flags) in legs {
        println!("Driving {} (speed={}, heading={})", name, speed, heading);
        rvr.drive_with_heading(speed, heading, flags)?;
        thread::sleep(Duration::from_secs(1));
    }

    rvr.drive_stop()?;
    println!("Stopped. {:?}", rvr.get_metrics());
    rvr.disconnect();
    Ok(())
}
