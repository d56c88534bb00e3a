// Copyright 2024 The FlowLink Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod function;
pub mod lambda_function;
pub mod layout;
pub mod ledger;
pub mod lifecycle;
pub mod memory_function;
pub mod memory_object_store;
pub mod memory_queue;
pub mod object_store;
pub mod queue;
pub mod resource_map;
mod sdk;
pub mod s3_object_store;
pub mod sqs_queue;

pub use function::FunctionInvoker;
pub use lambda_function::LambdaFunctionInvoker;
pub use layout::DeploymentLayout;
pub use ledger::ConcurrencyLedger;
pub use lifecycle::{LifecycleContext, LifecycleOutcome, RecordingLifecycleContext};
pub use memory_function::MemoryFunctionInvoker;
pub use memory_object_store::MemoryObjectStore;
pub use memory_queue::MemoryMessageQueue;
pub use object_store::ObjectStore;
pub use queue::{MessageQueue, ReceivedMessage};
pub use resource_map::ResourceMap;
pub use s3_object_store::S3ObjectStore;
pub use sqs_queue::SqsMessageQueue;
