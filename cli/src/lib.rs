pub mod slide_utils;
