#![allow(dead_code)]

pub mod epub_fixture;
