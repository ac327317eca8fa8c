/// Native module contains implementations of the sandbox trait
/// that run the interpreter as a plain child process,
/// using syscalls directly instead of containers.
pub mod executor;
pub mod limited;
pub mod process;
