// 结果导出模块
//
// 子模块：
// - faces: 裁剪人脸并写入目录汇总文件

pub mod faces;

pub use faces::FaceExporter;
