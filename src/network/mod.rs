//! Эталонный TCP-хост: построчный JSON поверх сокета.

pub mod server;
pub mod tcp;

pub use server::{run, ServerHandle};
pub use tcp::TcpConnection;
