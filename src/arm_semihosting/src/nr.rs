//! Semihosting operations

/// `SYS_OPEN`: open a file on the host
pub const OPEN: usize = 0x01;
/// `SYS_CLOSE`: close a file on the host
pub const CLOSE: usize = 0x02;
/// `SYS_WRITE`: write to a file on the host
pub const WRITE: usize = 0x05;
/// `SYS_READ`: read the contents of a file into a buffer
pub const READ: usize = 0x06;
/// `SYS_EXIT` (also known as `angel_SWIreason_ReportException`)
pub const EXIT: usize = 0x18;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_numbers() {
        assert_eq!([OPEN, CLOSE, WRITE, READ, EXIT], [1, 2, 5, 6, 0x18]);
    }
}
