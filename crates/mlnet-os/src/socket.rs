//! Socket mode control.

use crate::descriptor::{Descriptor, RawSocketHandle};
use crate::error::{OsError, Result};
use socket2::Socket;
use std::mem::ManuallyDrop;
use tracing::debug;

/// View a borrowed native socket as a `socket2::Socket` without taking
/// ownership.
fn borrow_socket(handle: RawSocketHandle) -> ManuallyDrop<Socket> {
    // SAFETY: the descriptor keeps the socket open for the duration of the
    // call, and ManuallyDrop keeps the Socket from closing it afterwards.
    #[cfg(unix)]
    let socket = unsafe { std::os::unix::io::FromRawFd::from_raw_fd(handle) };
    #[cfg(windows)]
    let socket = unsafe { std::os::windows::io::FromRawSocket::from_raw_socket(handle) };
    ManuallyDrop::new(socket)
}

/// Switch a socket to non-blocking mode.
///
/// Calling it on a socket that is already non-blocking succeeds without
/// changing anything. A failure is returned to the caller: a connection
/// that cannot be made non-blocking must not be used.
///
/// # Examples
/// ```no_run
/// use mlnet_os::{Descriptor, socket};
///
/// let stream = std::net::TcpStream::connect("127.0.0.1:4662").unwrap();
/// socket::set_nonblocking(&Descriptor::from_socket(&stream)).unwrap();
/// ```
pub fn set_nonblocking(sock: &Descriptor) -> Result<()> {
    let handle = sock.socket_handle_for("set_nonblocking")?;

    #[cfg(unix)]
    {
        if is_nonblocking(handle, sock)? {
            return Ok(());
        }
    }

    // FIONBIO on Windows is idempotent by itself
    let socket = borrow_socket(handle);
    socket
        .set_nonblocking(true)
        .map_err(|err| OsError::from_io(err, "set_nonblocking", sock.label()))?;

    debug!("{sock} switched to non-blocking mode");
    Ok(())
}

#[cfg(unix)]
fn is_nonblocking(handle: RawSocketHandle, sock: &Descriptor) -> Result<bool> {
    // SAFETY: F_GETFL only reads the descriptor's status flags.
    let flags = unsafe { libc::fcntl(handle, libc::F_GETFL) };
    if flags == -1 {
        return Err(OsError::uerror("fcntl", sock.label()));
    }
    Ok(flags & libc::O_NONBLOCK != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{ErrorKind, Read};
    use std::net::{TcpListener, TcpStream, UdpSocket};

    #[test]
    fn test_set_nonblocking_is_idempotent() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let sock = Descriptor::from_socket(&socket);

        set_nonblocking(&sock).unwrap();
        set_nonblocking(&sock).unwrap();

        let mut buf = [0u8; 16];
        let err = socket.recv_from(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn test_nonblocking_tcp_read_would_block() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (_server, _) = listener.accept().unwrap();

        set_nonblocking(&Descriptor::from_socket(&client)).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(
            client.read(&mut buf).unwrap_err().kind(),
            ErrorKind::WouldBlock
        );
    }

    #[test]
    fn test_socket_stays_open() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        set_nonblocking(&Descriptor::from_socket(&socket)).unwrap();
        assert!(socket.local_addr().is_ok());
    }

    #[test]
    fn test_rejects_file_descriptor() {
        let file = tempfile::tempfile().unwrap();
        assert!(matches!(
            set_nonblocking(&Descriptor::from_file(&file)),
            Err(OsError::InvalidDescriptorKind {
                operation: "set_nonblocking",
                ..
            })
        ));
    }
}
