//! Linux I2C 后端（`/dev/i2c-N` + `I2C_SLAVE` ioctl）
//!
//! 地址在打开时通过 ioctl 绑定到文件描述符，之后的块读写就是
//! 普通的 write/read：写寄存器命令字节（可带数据），读响应字节。

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;

use tracing::trace;

use crate::{BusError, I2cBus};

mod ffi {
    // Linux i2c-dev.h
    const I2C_SLAVE: u64 = 0x0703;
    nix::ioctl_write_int_bad!(i2c_slave, I2C_SLAVE as libc::c_ulong);
}

/// `/dev/i2c-N` 设备句柄
pub struct LinuxI2cDev {
    file: File,
    address: u16,
}

impl LinuxI2cDev {
    /// 打开总线 `bus` 上地址为 `address` 的设备
    pub fn open(bus: u8, address: u16) -> Result<Self, BusError> {
        let path = format!("/dev/i2c-{bus}");
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        unsafe { ffi::i2c_slave(file.as_raw_fd(), i32::from(address)) }
            .map_err(std::io::Error::from)?;
        trace!(bus, address, "opened i2c device");
        Ok(Self { file, address })
    }

    pub fn address(&self) -> u16 {
        self.address
    }
}

impl I2cBus for LinuxI2cDev {
    fn write_block(&mut self, command: u8, data: &[u8]) -> Result<(), BusError> {
        let mut buf = Vec::with_capacity(1 + data.len());
        buf.push(command);
        buf.extend_from_slice(data);
        self.file.write_all(&buf)?;
        Ok(())
    }

    fn read_block(&mut self, command: u8, len: usize) -> Result<Vec<u8>, BusError> {
        self.file.write_all(&[command])?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}
