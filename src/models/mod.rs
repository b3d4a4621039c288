pub mod communemodel;
pub mod photomodel;
pub mod projectmodel;
pub mod signalementmodel;
pub mod usermodel;
