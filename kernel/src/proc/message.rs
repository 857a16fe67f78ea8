use crate::proc::context::Pid;
use crate::proc::registry::Registry;

/// The inter-thread message transport. Queueing and delivery live behind it.
pub trait MessageTransport {
    /// Read the next message addressed to `thread` into `message`, returning the transport's
    /// status byte.
    fn read(&mut self, message: &mut [u8], thread: Pid) -> u8;
}

/// Read a message on behalf of whichever thread is running.
pub fn read_for_current_thread<T>(registry: &Registry, transport: &mut T, message: &mut [u8]) -> u8
where
    T: MessageTransport + ?Sized,
{
    transport.read(message, registry.own_pid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::registry::tests::spawn;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct RecordingTransport {
        readers: Vec<Pid>,
    }

    impl MessageTransport for RecordingTransport {
        fn read(&mut self, message: &mut [u8], thread: Pid) -> u8 {
            self.readers.push(thread);
            message.fill(thread as u8);
            0
        }
    }

    #[test]
    fn read_is_tagged_with_the_running_pid() {
        let mut registry = Registry::new();
        spawn(&mut registry, "A");
        spawn(&mut registry, "B");
        let mut transport = RecordingTransport::default();
        let mut message = [0u8; 4];

        read_for_current_thread(&registry, &mut transport, &mut message);
        registry.advance();
        registry.advance();
        let status = read_for_current_thread(&registry, &mut transport, &mut message);

        assert_eq!(status, 0);
        assert_eq!(transport.readers, [0, 2]);
        assert_eq!(message, [2; 4]);
    }
}
