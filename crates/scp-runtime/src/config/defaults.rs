//! Compile-time framework limits, merged by build.rs from the library
//! defaults and the optional board file named by `SCP_CONFIG_RS`.

include!(concat!(env!("OUT_DIR"), "/scp_merged_config.rs"));
