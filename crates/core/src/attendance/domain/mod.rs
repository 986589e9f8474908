pub mod attendance_machine;
pub mod attendance_record;
pub mod attendance_store;
