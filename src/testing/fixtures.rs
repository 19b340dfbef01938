use crate::adb::protocol::sync;

/// `ls -l /` on an older toolbox device: directories carry no size column.
pub const ROOT_LISTING: &str = "\
drwxr-xr-x root     root              2021-01-01 00:00 data\r
-rw-r--r-- root     root         1024 2021-01-01 00:00 default.prop\r
lrwxrwxrwx root     root              2021-01-01 00:00 sdcard -> /storage/self/primary\r
drwxr-xr-x root     root              2021-01-01 00:00 system\r
";

/// `ls -l -d /sdcard/` once the link resolves to a directory.
pub const SDCARD_PROBE: &str =
    "drwxrwx--x root     sdcard_rw          2021-01-01 00:00 sdcard\n";

/// `ls -l /data/`
pub const DATA_LISTING: &str = "\
drwxrwx--x system   system            2021-01-01 00:00 app\n\
drwxrwx--x system   system            2021-01-01 00:00 local\n";

/// `ls -l /data/app/`
pub const APP_LISTING: &str = "\
-rw-r--r-- system   system     123456 2021-02-03 04:05 Foo.apk\n\
-rw-r--r-- system   system       4096 2021-02-03 04:05 Zed.apk\n";

/// `pm list packages -f`
pub const PM_PACKAGES: &str = "\
package:/data/app/Foo.apk=com.example.foo\n\
package:/system/app/Settings.apk=com.android.settings\n";

/// 16-byte STAT reply.
pub fn stat_reply(mode: u32, size: u32, mtime: u32) -> Vec<u8> {
    let mut reply = sync::STAT.to_vec();
    reply.extend_from_slice(&mode.to_le_bytes());
    reply.extend_from_slice(&size.to_le_bytes());
    reply.extend_from_slice(&mtime.to_le_bytes());
    reply
}

/// DATA header followed by `payload`.
pub fn data_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = header(sync::DATA, payload.len() as u32);
    frame.extend_from_slice(payload);
    frame
}

pub fn done_frame() -> Vec<u8> {
    header(sync::DONE, 0)
}

pub fn okay_frame() -> Vec<u8> {
    header(sync::OKAY, 0)
}

/// FAIL header carrying `message`.
pub fn fail_frame(message: &str) -> Vec<u8> {
    let mut frame = header(sync::FAIL, message.len() as u32);
    frame.extend_from_slice(message.as_bytes());
    frame
}

pub fn header(tag: &[u8; 4], length: u32) -> Vec<u8> {
    let mut frame = tag.to_vec();
    frame.extend_from_slice(&length.to_le_bytes());
    frame
}
