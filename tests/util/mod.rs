// Not all helpers are used by all tests.
#![allow(dead_code)]

use std::io;
use std::os::unix::net::UnixStream;
use std::sync::Once;

pub fn init() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        env_logger::try_init().expect("unable to initialise logger");
    })
}

/// A connected socket pair with the read end in non-blocking mode.
pub fn socket_pair() -> io::Result<(UnixStream, UnixStream)> {
    let (writer, reader) = UnixStream::pair()?;
    reader.set_nonblocking(true)?;
    Ok((writer, reader))
}
