pub mod communedtos;
pub mod photodtos;
pub mod projectdtos;
pub mod signalementdtos;
pub mod userdtos;
