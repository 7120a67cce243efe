//! Реестр типов payload ("фабрика").
//!
//! Сопоставляет дискриминатор `type` с десериализатором и транслятором.
//! Типы регистрируются по одному или паками; повторная регистрация типа
//! отклоняется с предупреждением, побеждает первая.

pub mod factory;
pub mod pack;

pub use factory::{PackReport, TypeRegistry};
pub use pack::{Deserializer, Pack, PackEntry, Translator, Validate};
