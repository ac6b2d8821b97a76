pub type DieselError = diesel::result::Error;
